//! Integration tests: the full client (gateway, engine thread, session
//! controller, watchdogs, frame queues) driven against a scripted in-process
//! transport injected through `Client::with_connector`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use rtsp_client::protocol::{RtspRequest, RtspResponse};
use rtsp_client::{
    Client, ClientConfig, CommandOutcome, Connector, RtspTransport, SessionState, TransportEvent,
};

const SDP_TWO_LEGS: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=Mock\r\n\
t=0 0\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:track1\r\n\
m=video 0 RTP/AVP 97\r\n\
a=rtpmap:97 JPEG/90000\r\n\
a=control:track2\r\n";

const SDP_SWAPPED_FIRST_LEG: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=Mock\r\n\
t=0 0\r\n\
m=video 0 RTP/AVP 98\r\n\
a=rtpmap:98 H265/90000\r\n\
a=control:track1\r\n\
m=video 0 RTP/AVP 97\r\n\
a=rtpmap:97 JPEG/90000\r\n\
a=control:track2\r\n";

const SDP_UNSUPPORTED_ONLY: &str ="v=0\r\n\
s=Mock\r\n\
m=audio 0 RTP/AVP 97\r\n\
a=rtpmap:97 opus/48000\r\n\
a=control:track1\r\n";

const SDP_FINITE: &str = "v=0\r\n\
s=Mock\r\n\
a=range:npt=0-0.2\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:track1\r\n";

#[derive(Clone, Copy, PartialEq)]
enum DescribeBehavior {
    Answer,
    Reject,
    Silent,
    InvalidSdp,
}

struct ServerState {
    sdp: String,
    describe: DescribeBehavior,
    /// Control-URI suffixes whose SETUP is refused.
    setup_fail: Vec<&'static str>,
    play_fail: bool,
    /// Remaining connection attempts to refuse.
    connect_failures: usize,
    connects: usize,
    setups: usize,
    keepalives: usize,
    teardowns: usize,
    /// `Range: npt=S-` start offsets seen in PLAY requests.
    play_offsets: Vec<f64>,
    events: VecDeque<TransportEvent>,
}

#[derive(Clone)]
struct ScriptedServer {
    state: Arc<Mutex<ServerState>>,
}

impl ScriptedServer {
    fn new(sdp: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                sdp: sdp.to_string(),
                describe: DescribeBehavior::Answer,
                setup_fail: Vec::new(),
                play_fail: false,
                connect_failures: 0,
                connects: 0,
                setups: 0,
                keepalives: 0,
                teardowns: 0,
                play_offsets: Vec::new(),
                events: VecDeque::new(),
            })),
        }
    }

    fn push_rtp(&self, leg_index: usize, seq: u16, timestamp: u32) {
        let mut data = vec![2 << 6, 0x80 | 96]; // V=2, marker set
        data.extend_from_slice(&seq.to_be_bytes());
        data.extend_from_slice(&timestamp.to_be_bytes());
        data.extend_from_slice(&0xFEEDu32.to_be_bytes());
        data.extend_from_slice(&[0xAA; 4]);
        self.state
            .lock()
            .events
            .push_back(TransportEvent::Packet { leg_index, data });
    }

    fn disconnect(&self) {
        self.state
            .lock()
            .events
            .push_back(TransportEvent::Disconnected);
    }

    fn connects(&self) -> usize {
        self.state.lock().connects
    }

    fn setups(&self) -> usize {
        self.state.lock().setups
    }

    fn teardowns(&self) -> usize {
        self.state.lock().teardowns
    }

    fn play_offsets(&self) -> Vec<f64> {
        self.state.lock().play_offsets.clone()
    }
}

impl Connector for ScriptedServer {
    fn connect(&self, _target: &str) -> rtsp_client::Result<Box<dyn RtspTransport>> {
        let mut state = self.state.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(rtsp_client::ClientError::Io(
                std::io::ErrorKind::ConnectionRefused.into(),
            ));
        }
        state.connects += 1;
        state.events.clear();
        Ok(Box::new(ScriptedTransport {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedTransport {
    state: Arc<Mutex<ServerState>>,
}

fn ok_response(cseq: u32) -> RtspResponse {
    RtspResponse {
        status_code: 200,
        reason: "OK".to_string(),
        headers: vec![("CSeq".to_string(), cseq.to_string())],
        body: None,
    }
}

fn error_response(cseq: u32, code: u16) -> RtspResponse {
    RtspResponse {
        status_code: code,
        reason: "Error".to_string(),
        headers: vec![("CSeq".to_string(), cseq.to_string())],
        body: None,
    }
}

impl RtspTransport for ScriptedTransport {
    fn send_request(&mut self, request: &RtspRequest) -> rtsp_client::Result<()> {
        let mut state = self.state.lock();
        let cseq = request.cseq();
        let response = match request.method.as_str() {
            "DESCRIBE" => match state.describe {
                DescribeBehavior::Silent => return Ok(()),
                DescribeBehavior::Reject => error_response(cseq, 404),
                DescribeBehavior::InvalidSdp => {
                    let mut r = ok_response(cseq);
                    r.body = Some("not an sdp".to_string());
                    r
                }
                DescribeBehavior::Answer => {
                    let mut r = ok_response(cseq);
                    r.body = Some(state.sdp.clone());
                    r
                }
            },
            "SETUP" => {
                state.setups += 1;
                if state.setup_fail.iter().any(|t| request.uri.ends_with(t)) {
                    error_response(cseq, 461)
                } else {
                    let mut r = ok_response(cseq);
                    r.headers
                        .push(("Session".to_string(), "MOCK1;timeout=2".to_string()));
                    r
                }
            }
            "PLAY" => {
                let offset = request
                    .headers
                    .iter()
                    .find(|(name, _)| name == "Range")
                    .and_then(|(_, value)| value.strip_prefix("npt="))
                    .and_then(|v| v.split('-').next())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0);
                state.play_offsets.push(offset);
                if state.play_fail {
                    error_response(cseq, 455)
                } else {
                    ok_response(cseq)
                }
            }
            "GET_PARAMETER" => {
                state.keepalives += 1;
                ok_response(cseq)
            }
            "TEARDOWN" => {
                state.teardowns += 1;
                ok_response(cseq)
            }
            _ => error_response(cseq, 501),
        };
        state.events.push_back(TransportEvent::Response(response));
        Ok(())
    }

    fn poll_event(&mut self) -> rtsp_client::Result<Option<TransportEvent>> {
        Ok(self.state.lock().events.pop_front())
    }

    fn setup_transport_spec(&mut self, leg_index: usize) -> rtsp_client::Result<String> {
        Ok(format!("MOCK/AVP;leg={leg_index}"))
    }

    fn bind_leg(
        &mut self,
        _leg_index: usize,
        _transport_header: Option<&str>,
    ) -> rtsp_client::Result<()> {
        Ok(())
    }
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        target_latency: Duration::ZERO,
        gap_interval: Duration::from_millis(50),
        describe_timeout: Duration::from_millis(100),
        keep_alive: false,
        ..ClientConfig::default()
    }
}

fn client_with(server: &ScriptedServer, config: ClientConfig) -> Client {
    Client::with_connector(config, Box::new(server.clone()))
}

fn wait_for_state(client: &Client, want: SessionState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if client.state() == want {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    client.state() == want
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

const TARGET: &str = "rtsp://cam.local/stream";

// ---- scenario A: open + play --------------------------------------------

#[test]
fn open_then_play_with_two_legs() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let client = client_with(&server, fast_config());

    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::Success);
    assert_eq!(client.state(), SessionState::ReadyToPlay);

    let streams = client.streams();
    assert_eq!(streams.len(), 2, "both legs negotiated");
    assert_eq!(streams[0].codec, rtsp_client::Codec::H264);
    assert_eq!(streams[1].codec, rtsp_client::Codec::Mjpeg);

    assert_eq!(client.play().wait(), CommandOutcome::Success);
    assert_eq!(client.state(), SessionState::Playing);

    // Payload flows to the right leg's queue.
    server.push_rtp(0, 1, 0);
    server.push_rtp(0, 2, 9_000);
    let frame = streams[0].reader.pop();
    assert!(!frame.is_end_of_stream());
    assert_eq!(frame.timestamp_us, 0, "first timestamp is the baseline");
    assert_eq!(streams[0].reader.pop().timestamp_us, 100_000);

    client.shutdown().wait();
}

#[test]
fn unsupported_codec_is_skipped_not_fatal() {
    let sdp = "v=0\r\ns=Mock\r\n\
         m=audio 0 RTP/AVP 97\r\na=rtpmap:97 opus/48000\r\na=control:track1\r\n\
         m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\na=control:track2\r\n";
    let server = ScriptedServer::new(sdp);
    let client = client_with(&server, fast_config());

    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::Success);
    let streams = client.streams();
    assert_eq!(streams.len(), 1, "only the H264 leg is accepted");
    assert_eq!(server.setups(), 1, "no SETUP for the unsupported codec");

    client.shutdown().wait();
}

#[test]
fn failed_setup_skips_that_leg_only() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().setup_fail = vec!["track1"];
    let client = client_with(&server, fast_config());

    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::Success);
    let streams = client.streams();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].codec, rtsp_client::Codec::Mjpeg);

    client.shutdown().wait();
}

// ---- scenario C: negotiation failures -----------------------------------

#[test]
fn describe_timeout_resolves_server_not_reachable() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().describe = DescribeBehavior::Silent;
    let client = client_with(&server, fast_config());

    assert_eq!(
        client.open(TARGET, None).wait(),
        CommandOutcome::ServerNotReachable
    );
    assert_eq!(client.state(), SessionState::Initial);
    assert!(client.streams().is_empty());

    client.shutdown().wait();
}

#[test]
fn describe_rejection_resolves_negotiation_failed() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().describe = DescribeBehavior::Reject;
    let client = client_with(&server, fast_config());

    assert_eq!(
        client.open(TARGET, None).wait(),
        CommandOutcome::NegotiationFailed
    );
    assert_eq!(client.state(), SessionState::Initial);

    client.shutdown().wait();
}

#[test]
fn invalid_sdp_resolves_session_description_invalid() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().describe = DescribeBehavior::InvalidSdp;
    let client = client_with(&server, fast_config());

    assert_eq!(
        client.open(TARGET, None).wait(),
        CommandOutcome::SessionDescriptionInvalid
    );
    assert_eq!(client.state(), SessionState::Initial);

    client.shutdown().wait();
}

#[test]
fn zero_usable_legs_resolves_no_usable_legs() {
    let server = ScriptedServer::new(SDP_UNSUPPORTED_ONLY);
    let client = client_with(&server, fast_config());

    assert_eq!(
        client.open(TARGET, None).wait(),
        CommandOutcome::NoUsableLegs
    );
    assert_eq!(client.state(), SessionState::Initial);
    assert_eq!(server.setups(), 0);

    client.shutdown().wait();
}

#[test]
fn failure_outcome_never_observes_a_transient_state() {
    // The caller must only wake once the state machine has settled back to
    // Initial, never while the failure is still being unwound.
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().describe = DescribeBehavior::Reject;
    let client = client_with(&server, fast_config());

    for _ in 0..25 {
        assert_eq!(
            client.open(TARGET, None).wait(),
            CommandOutcome::NegotiationFailed
        );
        assert_eq!(client.state(), SessionState::Initial);
    }

    client.shutdown().wait();
}

#[test]
fn unreachable_connect_resolves_server_not_reachable() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().connect_failures = usize::MAX;
    let client = client_with(&server, fast_config());

    assert_eq!(
        client.open(TARGET, None).wait(),
        CommandOutcome::ServerNotReachable
    );
    assert_eq!(client.state(), SessionState::Initial);

    client.shutdown().wait();
}

// ---- wrong-state matrix ---------------------------------------------------

#[test]
fn commands_outside_transition_table_resolve_wrong_state() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let client = client_with(&server, fast_config());

    // At Initial, only Open (and Shutdown) are valid.
    assert_eq!(client.play().wait(), CommandOutcome::WrongState);
    assert_eq!(client.stop().wait(), CommandOutcome::WrongState);
    assert_eq!(client.reconnect().wait(), CommandOutcome::WrongState);
    assert_eq!(client.state(), SessionState::Initial);

    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::Success);

    // At ReadyToPlay, Open and Reconnect are invalid.
    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::WrongState);
    assert_eq!(client.reconnect().wait(), CommandOutcome::WrongState);
    assert_eq!(client.state(), SessionState::ReadyToPlay);

    assert_eq!(client.play().wait(), CommandOutcome::Success);

    // At Playing, Open and Play are invalid.
    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::WrongState);
    assert_eq!(client.play().wait(), CommandOutcome::WrongState);
    assert_eq!(client.state(), SessionState::Playing);

    client.shutdown().wait();
}

#[test]
fn play_failure_keeps_session_ready() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().play_fail = true;
    let client = client_with(&server, fast_config());

    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::Success);
    assert_eq!(client.play().wait(), CommandOutcome::PlayFailed);
    assert_eq!(client.state(), SessionState::ReadyToPlay);

    client.shutdown().wait();
}

// ---- scenario D: stop ------------------------------------------------------

#[test]
fn stop_while_playing_delivers_sentinels() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let client = client_with(&server, fast_config());

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();
    server.push_rtp(0, 1, 0);
    // The packet must land in the queue before Stop closes it.
    assert!(wait_until(|| !streams[0].reader.is_empty(), Duration::from_secs(2)));

    assert_eq!(client.stop().wait(), CommandOutcome::Success);
    assert_eq!(client.state(), SessionState::Initial);
    assert_eq!(server.teardowns(), 1);

    // Every leg's queue ends with exactly one sentinel, even the one that
    // never received payload.
    let first = streams[0].reader.pop();
    assert!(!first.is_end_of_stream(), "payload precedes the sentinel");
    assert!(streams[0].reader.pop().is_end_of_stream());
    assert!(streams[1].reader.pop().is_end_of_stream());

    // Fixed contract: a second Stop at Initial resolves WrongState.
    assert_eq!(client.stop().wait(), CommandOutcome::WrongState);

    client.shutdown().wait();
}

// ---- scenario B: gap watchdog + auto reconnect ----------------------------

#[test]
fn gap_watchdog_triggers_automatic_reconnect() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let mut config = fast_config();
    config.auto_reconnect = Duration::from_millis(50);
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();
    assert_eq!(server.connects(), 1);

    // Keep the session alive through one gap interval, then go silent.
    server.push_rtp(0, 1, 0);
    server.push_rtp(1, 1, 0);
    std::thread::sleep(Duration::from_millis(30));
    server.push_rtp(0, 2, 9_000);

    // Silence now: within a few gap intervals the client must reconnect on
    // its own and return to Playing.
    assert!(
        wait_until(|| server.connects() >= 2, Duration::from_secs(2)),
        "gap watchdog must trigger a reconnect without any external command"
    );

    // Feed both legs steadily so the recovered session stays alive while we
    // inspect it.
    let feeder_server = server.clone();
    let feeding = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let feeder_flag = feeding.clone();
    let feeder = std::thread::spawn(move || {
        let mut seq = 10u16;
        while feeder_flag.load(std::sync::atomic::Ordering::Relaxed) {
            feeder_server.push_rtp(0, seq, u32::from(seq) * 3_000);
            feeder_server.push_rtp(1, seq, u32::from(seq) * 3_000);
            seq = seq.wrapping_add(1);
            std::thread::sleep(Duration::from_millis(15));
        }
    });

    assert!(wait_for_state(&client, SessionState::Playing, Duration::from_secs(2)));
    assert_eq!(server.connects(), 2);

    // The surviving queues were re-matched, not replaced.
    assert!(client.streams().is_empty(), "no new readers after reconnect");
    assert_eq!(streams[0].reader.baseline_resets(), 1);
    assert_eq!(streams[1].reader.baseline_resets(), 1);

    // Payload keeps flowing into the same queues after the reconnect.
    assert!(!streams[0].reader.pop().is_end_of_stream());
    assert!(!streams[1].reader.pop().is_end_of_stream());

    feeding.store(false, std::sync::atomic::Ordering::Relaxed);
    feeder.join().ok();
    client.shutdown().wait();
}

#[test]
fn gap_without_reconnect_policy_stops_cleanly() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let client = client_with(&server, fast_config()); // auto_reconnect = 0

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();

    // No packets at all: the first gap check declares the session dead.
    assert!(wait_for_state(&client, SessionState::Initial, Duration::from_secs(2)));
    assert!(streams[0].reader.pop().is_end_of_stream());
    assert!(streams[1].reader.pop().is_end_of_stream());
    assert_eq!(server.connects(), 1, "no reconnect with the policy disabled");

    client.shutdown().wait();
}

// ---- reconnect position recovery ------------------------------------------

#[test]
fn reconnect_advances_offset_by_consumed_position() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let mut config = fast_config();
    config.gap_interval = Duration::from_secs(60); // keep the watchdog away
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();

    // Leg 0 consumer reaches 2.0s, leg 1 reaches 1.0s (90 kHz clock).
    server.push_rtp(0, 1, 0);
    server.push_rtp(0, 2, 180_000);
    server.push_rtp(1, 1, 0);
    server.push_rtp(1, 2, 90_000);
    for _ in 0..2 {
        streams[0].reader.pop();
        streams[1].reader.pop();
    }
    assert_eq!(streams[0].reader.current_play_position_us(), 2_000_000);
    assert_eq!(streams[1].reader.current_play_position_us(), 1_000_000);

    assert_eq!(client.reconnect().wait(), CommandOutcome::Success);
    assert_eq!(client.state(), SessionState::Playing);

    let offsets = server.play_offsets();
    assert_eq!(offsets.len(), 2);
    assert_eq!(offsets[0], 0.0);
    // Most conservative leg: min(2.0, 1.0) = 1.0s, never rewinding below
    // any leg's consumed position... and never skipping past the slowest.
    assert!((offsets[1] - 1.0).abs() < 1e-6, "offset must advance by 1.0s, got {}", offsets[1]);

    assert_eq!(streams[0].reader.baseline_resets(), 1);
    assert_eq!(streams[1].reader.baseline_resets(), 1);

    client.shutdown().wait();
}

#[test]
fn reconnect_with_changed_codec_publishes_a_fresh_stream() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let mut config = fast_config();
    config.gap_interval = Duration::from_secs(60);
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    let streams = client.streams();
    assert_eq!(streams[0].codec, rtsp_client::Codec::H264);
    client.play().wait();

    // The source now offers H265 on the first leg.
    server.state.lock().sdp = SDP_SWAPPED_FIRST_LEG.to_string();
    assert_eq!(client.reconnect().wait(), CommandOutcome::Success);

    // The old H264 queue ends; a fresh reader carries the new codec.
    assert!(streams[0].reader.pop().is_end_of_stream());
    let fresh = client.streams();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].codec, rtsp_client::Codec::H265);

    // The JPEG leg survived the reconnect on its existing queue.
    assert_eq!(streams[1].reader.baseline_resets(), 1);
    server.push_rtp(1, 1, 0);
    assert!(!streams[1].reader.pop().is_end_of_stream());

    client.shutdown().wait();
}

// ---- fail-fast then silent retry ------------------------------------------

#[test]
fn failed_initial_open_retries_silently_under_policy() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().connect_failures = 1;
    let mut config = fast_config();
    config.auto_reconnect = Duration::from_millis(40);
    let client = client_with(&server, config);

    // The original caller is answered with the failure immediately...
    assert_eq!(
        client.open(TARGET, None).wait(),
        CommandOutcome::ServerNotReachable
    );
    assert_eq!(client.state(), SessionState::Initial);

    // ...and an internal retry then negotiates without any further command.
    assert!(
        wait_for_state(&client, SessionState::ReadyToPlay, Duration::from_secs(2)),
        "silent retry must negotiate the session"
    );
    assert_eq!(server.connects(), 1);

    client.shutdown().wait();
}

// ---- remote teardown --------------------------------------------------------

#[test]
fn remote_disconnect_is_clean_end_of_stream_not_retried() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let mut config = fast_config();
    config.auto_reconnect = Duration::from_millis(40);
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();

    server.disconnect();

    assert!(wait_for_state(&client, SessionState::Initial, Duration::from_secs(2)));
    assert!(streams[0].reader.pop().is_end_of_stream());
    assert!(streams[1].reader.pop().is_end_of_stream());

    // Explicit remote teardown is never retried, even under the policy.
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(server.connects(), 1);
    assert_eq!(client.state(), SessionState::Initial);

    client.shutdown().wait();
}

// ---- keep-alive -------------------------------------------------------------

#[test]
fn keep_alive_requests_flow_while_playing() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let mut config = fast_config();
    config.keep_alive = true;
    config.gap_interval = Duration::from_secs(60);
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    client.play().wait();

    // The server granted a 2s session timeout, so a keep-alive request must
    // go out within half of that.
    assert!(
        wait_until(|| server.state.lock().keepalives >= 1, Duration::from_secs(3)),
        "keep-alive must refresh the session before the granted timeout"
    );
    assert_eq!(client.state(), SessionState::Playing);

    client.shutdown().wait();
}

// ---- session duration timer -------------------------------------------------

#[test]
fn finite_session_stops_at_declared_end() {
    let server = ScriptedServer::new(SDP_FINITE);
    let mut config = fast_config();
    config.gap_interval = Duration::from_secs(60);
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();
    assert_eq!(client.state(), SessionState::Playing);

    // Declared duration is 0.2s; the duration watchdog must stop cleanly.
    assert!(wait_for_state(&client, SessionState::Initial, Duration::from_secs(2)));
    assert!(streams[0].reader.pop().is_end_of_stream());
    assert_eq!(server.teardowns(), 1);

    client.shutdown().wait();
}

// ---- shutdown ---------------------------------------------------------------

#[test]
fn shutdown_resolves_everything_and_closes_the_gateway() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let client = client_with(&server, fast_config());

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();

    assert_eq!(client.shutdown().wait(), CommandOutcome::Success);
    assert!(streams[0].reader.pop().is_end_of_stream());
    assert!(streams[1].reader.pop().is_end_of_stream());

    // Every submission after shutdown resolves Closed, immediately.
    assert_eq!(client.open(TARGET, None).wait(), CommandOutcome::Closed);
    assert_eq!(client.play().wait(), CommandOutcome::Closed);
    assert_eq!(client.shutdown().wait(), CommandOutcome::Closed);
}

#[test]
fn shutdown_during_reconnect_negotiation_delivers_sentinels() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    let mut config = fast_config();
    config.gap_interval = Duration::from_secs(60);
    config.describe_timeout = Duration::from_secs(60); // never fires in test
    let client = client_with(&server, config);

    client.open(TARGET, None).wait();
    let streams = client.streams();
    client.play().wait();

    // The reconnect's DESCRIBE goes unanswered, so the negotiation is still
    // holding the surviving queues when Shutdown arrives.
    server.state.lock().describe = DescribeBehavior::Silent;
    let reconnect = client.reconnect();

    assert_eq!(client.shutdown().wait(), CommandOutcome::Success);
    assert_eq!(reconnect.wait(), CommandOutcome::Closed);
    assert!(streams[0].reader.pop().is_end_of_stream());
    assert!(streams[1].reader.pop().is_end_of_stream());
}

#[test]
fn every_ticket_resolves_after_shutdown() {
    let server = ScriptedServer::new(SDP_TWO_LEGS);
    server.state.lock().describe = DescribeBehavior::Silent;
    let mut config = fast_config();
    config.describe_timeout = Duration::from_secs(60); // never fires in test
    let client = client_with(&server, config);

    // This open would otherwise hang on the silent DESCRIBE.
    let open_ticket = client.open(TARGET, None);
    let shutdown_ticket = client.shutdown();

    assert_eq!(shutdown_ticket.wait(), CommandOutcome::Success);
    assert_eq!(open_ticket.wait(), CommandOutcome::Closed);
}
