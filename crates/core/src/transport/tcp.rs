//! TCP control connection and interleaved RTP transport.
//!
//! [`TcpControl`] owns the non-blocking RTSP connection and incrementally
//! demultiplexes its byte stream into RTSP responses and `$`-framed
//! interleaved binary data (RFC 2326 §10.12):
//!
//! ```text
//! '$' | channel (1 byte) | length (2 bytes, BE) | length bytes of RTP
//! ```
//!
//! [`TcpTransport`] is the reliable-mode transport: RTP for leg *i* arrives
//! on interleaved channel *2i* (RTCP on *2i+1*, which is read and dropped).

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::{ClientError, Result};
use crate::protocol::{RtspRequest, RtspResponse};
use crate::transport::{CONNECT_TIMEOUT, RtspTransport, TransportEvent};

/// One demultiplexed unit from the control connection.
#[derive(Debug)]
pub enum ControlEvent {
    Response(RtspResponse),
    Interleaved { channel: u8, data: Vec<u8> },
    Eof,
}

/// Non-blocking RTSP control connection with incremental parsing.
pub struct TcpControl {
    stream: TcpStream,
    buf: Vec<u8>,
    eof: bool,
}

impl TcpControl {
    /// Connect with a bounded timeout, then switch to non-blocking mode so
    /// the engine loop can poll without stalling.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ClientError::Io(ErrorKind::AddrNotAvailable.into()))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        tracing::debug!(%addr, "control connection established");
        Ok(Self {
            stream,
            buf: Vec::new(),
            eof: false,
        })
    }

    pub fn send(&mut self, request: &RtspRequest) -> Result<()> {
        let text = request.serialize();
        tracing::trace!(method = %request.method, cseq = request.cseq(), "sending request");
        self.stream.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Pull whatever bytes are ready into the buffer.
    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Non-blocking poll for the next complete control event.
    pub fn poll_event(&mut self) -> Result<Option<ControlEvent>> {
        self.fill()?;

        if let Some(event) = self.parse_buffered()? {
            return Ok(Some(event));
        }
        if self.eof && self.buf.is_empty() {
            return Ok(Some(ControlEvent::Eof));
        }
        Ok(None)
    }

    fn parse_buffered(&mut self) -> Result<Option<ControlEvent>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        if self.buf[0] == b'$' {
            // Interleaved frame header: '$', channel, 2-byte length.
            if self.buf.len() < 4 {
                return Ok(None);
            }
            let channel = self.buf[1];
            let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            if self.buf.len() < 4 + len {
                return Ok(None);
            }
            let data = self.buf[4..4 + len].to_vec();
            self.buf.drain(..4 + len);
            return Ok(Some(ControlEvent::Interleaved { channel, data }));
        }

        // Otherwise the buffer starts with an RTSP response head.
        let head_end = match find_blank_line(&self.buf) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let head = String::from_utf8_lossy(&self.buf[..head_end]).into_owned();
        let body_len = content_length(&head);
        let total = head_end + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&self.buf[..total]).into_owned();
        self.buf.drain(..total);
        let response = RtspResponse::parse(&text)?;
        tracing::trace!(
            status = response.status_code,
            cseq = ?response.cseq(),
            "response received"
        );
        Ok(Some(ControlEvent::Response(response)))
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Reliable-mode transport: everything interleaved on the control socket.
pub struct TcpTransport {
    control: TcpControl,
}

impl TcpTransport {
    pub fn new(control: TcpControl) -> Self {
        Self { control }
    }
}

impl RtspTransport for TcpTransport {
    fn send_request(&mut self, request: &RtspRequest) -> Result<()> {
        self.control.send(request)
    }

    fn poll_event(&mut self) -> Result<Option<TransportEvent>> {
        loop {
            match self.control.poll_event()? {
                Some(ControlEvent::Response(response)) => {
                    return Ok(Some(TransportEvent::Response(response)));
                }
                Some(ControlEvent::Interleaved { channel, data }) => {
                    if channel % 2 != 0 {
                        continue; // RTCP channel, not delivered
                    }
                    return Ok(Some(TransportEvent::Packet {
                        leg_index: (channel / 2) as usize,
                        data,
                    }));
                }
                Some(ControlEvent::Eof) => return Ok(Some(TransportEvent::Disconnected)),
                None => return Ok(None),
            }
        }
    }

    fn setup_transport_spec(&mut self, leg_index: usize) -> Result<String> {
        let rtp = leg_index * 2;
        Ok(format!("RTP/AVP/TCP;unicast;interleaved={}-{}", rtp, rtp + 1))
    }

    fn bind_leg(&mut self, _leg_index: usize, _transport_header: Option<&str>) -> Result<()> {
        // Channel numbers are fixed by the offer; nothing to allocate.
        Ok(())
    }
}
