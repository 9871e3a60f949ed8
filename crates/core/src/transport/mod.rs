//! Transport abstraction between the protocol engine and the network.
//!
//! The engine never blocks on I/O: it polls a [`RtspTransport`] each loop
//! iteration for whatever is ready (a complete response, an RTP packet, or a
//! disconnect). Two real implementations exist, selected by
//! [`TransportMode`]:
//!
//! - [`tcp::TcpTransport`] — reliable: RTP interleaved on the RTSP control
//!   connection (RFC 2326 §10.12).
//! - [`udp::UdpTransport`] — best-effort: per-leg UDP port pairs, RTSP
//!   control still on TCP.
//!
//! [`Connector`] is the creation seam: the client uses
//! [`DefaultConnector`] against real sockets, and the integration tests
//! inject scripted transports through
//! [`Client::with_connector`](crate::client::Client::with_connector).

pub mod tcp;
pub mod udp;

use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::protocol::{RtspRequest, RtspResponse};

/// How payload is delivered from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// RTP interleaved over the RTSP TCP connection.
    #[default]
    Reliable,
    /// RTP over per-leg UDP sockets.
    BestEffort,
}

/// One thing the transport had ready when polled.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete RTSP response arrived on the control connection.
    Response(RtspResponse),
    /// One RTP packet for the given leg.
    Packet { leg_index: usize, data: Vec<u8> },
    /// The far end closed the control connection.
    Disconnected,
}

/// A connected transport for one session.
///
/// All methods are called from the engine thread only and must never block:
/// `poll_event` returns `None` when nothing is ready.
pub trait RtspTransport: Send {
    /// Send a serialized request on the control connection.
    fn send_request(&mut self, request: &RtspRequest) -> Result<()>;

    /// Non-blocking poll for the next ready event.
    fn poll_event(&mut self) -> Result<Option<TransportEvent>>;

    /// The `Transport` header value to offer in SETUP for leg `leg_index`
    /// (allocating local resources, e.g. UDP port pairs, as needed).
    fn setup_transport_spec(&mut self, leg_index: usize) -> Result<String>;

    /// Complete leg setup from the server's `Transport` response header.
    fn bind_leg(&mut self, leg_index: usize, transport_header: Option<&str>) -> Result<()>;
}

/// Creates a transport for a target address. One transport per session
/// attempt; reconnects get a fresh one.
pub trait Connector: Send {
    fn connect(&self, target: &str) -> Result<Box<dyn RtspTransport>>;
}

/// Timeout for establishing the TCP control connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Real-socket connector used by default.
pub struct DefaultConnector {
    mode: TransportMode,
    /// When non-zero, the control connection dials this port instead of the
    /// one in the target URL.
    tunnel_port: u16,
}

impl DefaultConnector {
    pub fn new(mode: TransportMode, tunnel_port: u16) -> Self {
        Self { mode, tunnel_port }
    }
}

impl Connector for DefaultConnector {
    fn connect(&self, target: &str) -> Result<Box<dyn RtspTransport>> {
        let (host, mut port) = parse_target(target)?;
        if self.tunnel_port != 0 {
            port = self.tunnel_port;
        }
        let control = tcp::TcpControl::connect(&host, port)?;
        match self.mode {
            TransportMode::Reliable => Ok(Box::new(tcp::TcpTransport::new(control))),
            TransportMode::BestEffort => Ok(Box::new(udp::UdpTransport::new(control))),
        }
    }
}

/// Extract `(host, port)` from an `rtsp://host[:port]/path` URL. The
/// default RTSP port is 554 (RFC 2326 §3.2).
pub fn parse_target(target: &str) -> Result<(String, u16)> {
    let after_scheme = target
        .strip_prefix("rtsp://")
        .or_else(|| target.strip_prefix("rtsps://"))
        .ok_or_else(|| ClientError::Unsupported(format!("not an rtsp url: {target}")))?;

    let host_port = after_scheme.split('/').next().unwrap_or("");
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse()
                .map_err(|_| ClientError::Unsupported(format!("bad port in {target}")))?,
        ),
        None => (host_port, 554),
    };

    if host.is_empty() {
        return Err(ClientError::Unsupported(format!("no host in {target}")));
    }
    Ok((host.to_string(), port))
}
