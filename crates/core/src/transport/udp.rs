//! Best-effort UDP payload transport.
//!
//! RTSP control stays on TCP; each accepted leg gets a local RTP/RTCP UDP
//! port pair offered in the SETUP `Transport` header
//! (`RTP/AVP;unicast;client_port=R-R+1`). Port pairs are allocated on a
//! random even base per RFC 3550 §11, retrying on collision.

use std::io::ErrorKind;
use std::net::UdpSocket;

use rand::RngExt;

use crate::error::{ClientError, Result};
use crate::protocol::RtspRequest;
use crate::transport::tcp::{ControlEvent, TcpControl};
use crate::transport::{RtspTransport, TransportEvent};

const PORT_RANGE_START: u16 = 16_384;
const PORT_RANGE_LEN: u16 = 16_384;
const BIND_ATTEMPTS: usize = 16;

/// A bound RTP/RTCP socket pair for one leg.
struct UdpLeg {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    rtp_port: u16,
}

impl UdpLeg {
    /// Bind a pair on a random even base port.
    fn bind_random_pair() -> Result<Self> {
        let mut rng = rand::rng();
        for _ in 0..BIND_ATTEMPTS {
            let base = PORT_RANGE_START + (rng.random_range(0..PORT_RANGE_LEN / 2)) * 2;
            let rtp = match UdpSocket::bind(("0.0.0.0", base)) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let rtcp = match UdpSocket::bind(("0.0.0.0", base + 1)) {
                Ok(s) => s,
                Err(_) => continue,
            };
            rtp.set_nonblocking(true)?;
            rtcp.set_nonblocking(true)?;
            tracing::debug!(rtp_port = base, "bound UDP leg port pair");
            return Ok(Self {
                rtp,
                rtcp,
                rtp_port: base,
            });
        }
        Err(ClientError::Io(ErrorKind::AddrInUse.into()))
    }

    /// Non-blocking receive of one RTP datagram.
    fn poll_rtp(&self, buf: &mut [u8]) -> Result<Option<Vec<u8>>> {
        match self.rtp.recv_from(buf) {
            Ok((n, _)) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drain and discard RTCP so the socket buffer cannot fill up.
    fn drain_rtcp(&self, buf: &mut [u8]) {
        while matches!(self.rtcp.recv_from(buf), Ok(_)) {}
    }
}

/// Best-effort-mode transport: TCP control plus per-leg UDP sockets.
pub struct UdpTransport {
    control: TcpControl,
    legs: Vec<Option<UdpLeg>>,
    recv_buf: Box<[u8; 65_536]>,
}

impl UdpTransport {
    pub fn new(control: TcpControl) -> Self {
        Self {
            control,
            legs: Vec::new(),
            recv_buf: Box::new([0u8; 65_536]),
        }
    }
}

impl RtspTransport for UdpTransport {
    fn send_request(&mut self, request: &RtspRequest) -> Result<()> {
        self.control.send(request)
    }

    fn poll_event(&mut self) -> Result<Option<TransportEvent>> {
        // Control connection first: responses gate the state machine.
        loop {
            match self.control.poll_event()? {
                Some(ControlEvent::Response(response)) => {
                    return Ok(Some(TransportEvent::Response(response)));
                }
                Some(ControlEvent::Interleaved { .. }) => continue, // not expected in UDP mode
                Some(ControlEvent::Eof) => return Ok(Some(TransportEvent::Disconnected)),
                None => break,
            }
        }

        for leg_index in 0..self.legs.len() {
            let Some(leg) = &self.legs[leg_index] else {
                continue;
            };
            leg.drain_rtcp(&mut self.recv_buf[..]);
            if let Some(data) = leg.poll_rtp(&mut self.recv_buf[..])? {
                return Ok(Some(TransportEvent::Packet { leg_index, data }));
            }
        }
        Ok(None)
    }

    fn setup_transport_spec(&mut self, leg_index: usize) -> Result<String> {
        let leg = UdpLeg::bind_random_pair()?;
        let spec = format!(
            "RTP/AVP;unicast;client_port={}-{}",
            leg.rtp_port,
            leg.rtp_port + 1
        );
        if self.legs.len() <= leg_index {
            self.legs.resize_with(leg_index + 1, || None);
        }
        self.legs[leg_index] = Some(leg);
        Ok(spec)
    }

    fn bind_leg(&mut self, leg_index: usize, transport_header: Option<&str>) -> Result<()> {
        // The server's Transport header confirms the negotiated ports; the
        // sockets are already bound, so this is informational only.
        if let Some(header) = transport_header {
            tracing::debug!(leg_index, transport = header, "leg transport confirmed");
        }
        if self.legs.get(leg_index).map(Option::is_some) != Some(true) {
            return Err(ClientError::NoTransport);
        }
        Ok(())
    }
}
