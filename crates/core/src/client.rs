//! Public client handle and configuration.
//!
//! [`Client::new`] spawns the engine thread; every method on [`Client`] is
//! safe to call from any thread and returns a [`CommandTicket`] the caller
//! can block on or poll. Received media is consumed through the
//! [`MediaStream`] handles published after a successful open.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{CommandOp, CommandTicket, Credentials, Gateway};
use crate::engine::Engine;
use crate::frame::StreamReader;
use crate::media::Codec;
use crate::session::SessionState;
use crate::session::controller::Controller;
use crate::transport::{Connector, DefaultConnector, TransportMode};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reliable (TCP interleaved) or best-effort (UDP) payload delivery.
    pub transport_mode: TransportMode,
    /// When non-zero, the control connection dials this port instead of the
    /// target URL's.
    pub tunnel_port: u16,
    /// Initial seek offset into the presentation, in seconds.
    pub initial_seek_secs: f64,
    /// Per-leg consumer queue capacity, in frames.
    pub receive_buffer_frames: usize,
    /// Delay between automatic reconnect attempts. Zero disables the
    /// auto-reconnect policy entirely.
    pub auto_reconnect: Duration,
    /// Target end-to-end latency, subtracted from delivered timestamps when
    /// reporting consumer play positions.
    pub target_latency: Duration,
    /// Whether to send periodic keep-alive requests while playing.
    pub keep_alive: bool,
    /// Interval of the packet-arrival gap watchdog.
    pub gap_interval: Duration,
    /// How long to wait for a DESCRIBE response before declaring the
    /// server unreachable.
    pub describe_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport_mode: TransportMode::Reliable,
            tunnel_port: 0,
            initial_seek_secs: 0.0,
            receive_buffer_frames: 512,
            auto_reconnect: Duration::ZERO,
            target_latency: Duration::from_millis(200),
            keep_alive: true,
            gap_interval: Duration::from_secs(2),
            describe_timeout: Duration::from_secs(5),
        }
    }
}

/// One negotiated stream leg, handed to exactly one consumer thread.
///
/// Pop frames until [`Frame::is_end_of_stream`](crate::Frame::is_end_of_stream)
/// is true; the sentinel is guaranteed to arrive on every teardown path.
pub struct MediaStream {
    pub codec: Codec,
    /// Media kind from the session description (`video`, `audio`, ...).
    pub kind: String,
    pub reader: StreamReader,
}

/// A resilient RTSP client.
///
/// Construction spawns the engine thread; dropping the client shuts it
/// down. All command methods merely enqueue and return immediately.
pub struct Client {
    gateway: Gateway,
    published_state: Arc<AtomicU8>,
    streams: Arc<Mutex<VecDeque<MediaStream>>>,
    engine: Option<JoinHandle<()>>,
}

impl Client {
    /// Create a client using real sockets per the configured transport mode.
    pub fn new(config: ClientConfig) -> Self {
        let connector = Box::new(DefaultConnector::new(
            config.transport_mode,
            config.tunnel_port,
        ));
        Self::with_connector(config, connector)
    }

    /// Create a client with a custom transport [`Connector`].
    ///
    /// This is the seam the integration tests use to drive the full state
    /// machine against a scripted in-process server.
    pub fn with_connector(config: ClientConfig, connector: Box<dyn Connector>) -> Self {
        let gateway = Gateway::new();
        let published_state = Arc::new(AtomicU8::new(SessionState::Initial as u8));
        let streams = Arc::new(Mutex::new(VecDeque::new()));

        let controller = Controller::new(
            config,
            connector,
            published_state.clone(),
            streams.clone(),
        );
        let engine = Engine::new(gateway.clone(), controller);
        let handle = match thread::Builder::new()
            .name("rtsp-engine".to_string())
            .spawn(move || engine.run())
        {
            Ok(handle) => Some(handle),
            Err(error) => {
                // Without an engine thread no command can ever run; close
                // the gateway so every submitted ticket resolves `Closed`
                // instead of blocking forever.
                tracing::error!(%error, "failed to spawn engine thread");
                gateway.close();
                None
            }
        };

        Self {
            gateway,
            published_state,
            streams,
            engine: handle,
        }
    }

    /// Negotiate a session against `target` (an `rtsp://` URL).
    pub fn open(&self, target: &str, credentials: Option<Credentials>) -> CommandTicket {
        self.gateway.submit(CommandOp::Open {
            target: target.to_string(),
            credentials,
        })
    }

    /// Start playback of the negotiated session.
    pub fn play(&self) -> CommandTicket {
        self.gateway.submit(CommandOp::Play)
    }

    /// Tear the session down. Every leg's queue receives its sentinel.
    pub fn stop(&self) -> CommandTicket {
        self.gateway.submit(CommandOp::Stop)
    }

    /// Renegotiate the current session with position recovery.
    pub fn reconnect(&self) -> CommandTicket {
        self.gateway.submit(CommandOp::Reconnect)
    }

    /// Stop, then terminate the engine thread. Always resolves `Success`
    /// (or `Closed` if already shut down).
    pub fn shutdown(&self) -> CommandTicket {
        self.gateway.submit(CommandOp::Shutdown)
    }

    /// Snapshot of the current session state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.published_state.load(std::sync::atomic::Ordering::Acquire))
    }

    /// Take the stream handles negotiated since the last call. Each handle
    /// must go to exactly one consumer thread.
    pub fn streams(&self) -> Vec<MediaStream> {
        self.streams.lock().drain(..).collect()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(engine) = self.engine.take()
            && let Err(error) = engine.join()
        {
            tracing::warn!(?error, "engine thread panicked");
        }
    }
}
