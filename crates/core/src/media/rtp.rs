//! RTP fixed-header parsing (RFC 3550 §5.1).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         payload ...                           |
//! ```
//!
//! The receive side only needs the fields used for delivery: timestamp
//! (presentation clock), marker (sync-point flag), and sequence (logging).
//! CSRC entries and header extensions are skipped over, not interpreted.

use crate::error::{ClientError, ParseErrorKind, Result};

const FIXED_HEADER_LEN: usize = 12;

/// A parsed inbound RTP packet, borrowing its payload from the receive
/// buffer.
#[derive(Debug)]
pub struct RtpPacket<'a> {
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub marker: bool,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse one RTP packet from a datagram or interleaved channel body.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(ClientError::Parse {
                kind: ParseErrorKind::InvalidRtp,
            });
        }

        let version = data[0] >> 6;
        if version != 2 {
            return Err(ClientError::Parse {
                kind: ParseErrorKind::InvalidRtp,
            });
        }

        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;

        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = FIXED_HEADER_LEN + csrc_count * 4;
        if data.len() < offset {
            return Err(ClientError::Parse {
                kind: ParseErrorKind::InvalidRtp,
            });
        }

        if extension {
            // Extension header: 2 bytes profile, 2 bytes length in words.
            if data.len() < offset + 4 {
                return Err(ClientError::Parse {
                    kind: ParseErrorKind::InvalidRtp,
                });
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if data.len() < offset {
                return Err(ClientError::Parse {
                    kind: ParseErrorKind::InvalidRtp,
                });
            }
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            if pad == 0 || pad > end - offset {
                return Err(ClientError::Parse {
                    kind: ParseErrorKind::InvalidRtp,
                });
            }
            end -= pad;
        }

        Ok(Self {
            payload_type,
            sequence,
            timestamp,
            ssrc,
            marker,
            payload: &data[offset..end],
        })
    }
}
