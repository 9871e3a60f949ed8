use std::io;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rtsp_client::{Client, ClientConfig, CommandOutcome, Credentials, TransportMode};

#[derive(Parser)]
#[command(
    name = "rtsp-play",
    about = "Play an RTSP stream and report received frames"
)]
struct Args {
    /// Stream URL (rtsp://host[:port]/path)
    url: String,

    /// Transport for media data
    #[arg(long, value_enum, default_value = "tcp")]
    transport: Transport,

    /// Username for basic authentication
    #[arg(long)]
    username: Option<String>,

    /// Password for basic authentication
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Seconds between reconnect attempts after a silent failure (0 disables)
    #[arg(long, default_value_t = 5)]
    reconnect: u64,

    /// Seek this many seconds into the stream before playing
    #[arg(long, default_value_t = 0.0)]
    seek: f64,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Transport {
    Tcp,
    Udp,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ClientConfig {
        transport_mode: match args.transport {
            Transport::Tcp => TransportMode::Reliable,
            Transport::Udp => TransportMode::BestEffort,
        },
        initial_seek_secs: args.seek,
        auto_reconnect: Duration::from_secs(args.reconnect),
        ..ClientConfig::default()
    };
    let credentials = args.username.map(|username| Credentials {
        username,
        password: args.password.unwrap_or_default(),
    });

    let client = Client::new(config);

    match client.open(&args.url, credentials).wait() {
        CommandOutcome::Success => {}
        outcome => {
            eprintln!("Failed to open {}: {:?}", args.url, outcome);
            return;
        }
    }

    let streams = client.streams();
    println!(
        "Negotiated {} stream(s): {}",
        streams.len(),
        streams
            .iter()
            .map(|s| s.codec.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let consumers: Vec<_> = streams
        .into_iter()
        .enumerate()
        .map(|(index, stream)| {
            thread::spawn(move || {
                let mut frames = 0u64;
                let mut bytes = 0u64;
                loop {
                    let frame = stream.reader.pop();
                    if frame.is_end_of_stream() {
                        break;
                    }
                    frames += 1;
                    bytes += frame.payload.len() as u64;
                    if frames % 250 == 0 {
                        println!(
                            "stream {index} ({}): {frames} frames, {bytes} bytes, position {:.1}s",
                            stream.codec.name(),
                            stream.reader.current_play_position_us() as f64 / 1e6
                        );
                    }
                }
                println!("stream {index}: end of stream after {frames} frames");
            })
        })
        .collect();

    if client.play().wait() != CommandOutcome::Success {
        eprintln!("Failed to start playback");
        client.shutdown().wait();
        return;
    }

    println!("Playing {} — press Enter to stop", args.url);
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    client.shutdown().wait();
    for consumer in consumers {
        let _ = consumer.join();
    }
}
