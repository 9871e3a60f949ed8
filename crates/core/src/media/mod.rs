//! Media identity and RTP payload handling.
//!
//! The client is codec-agnostic: payload bytes flow through untouched and
//! are interpreted by the downstream decoder. This module only covers what
//! negotiation and delivery genuinely need:
//!
//! - [`Codec`] — the supported-codec set checked against SDP `a=rtpmap`
//!   names. A candidate leg with an unrecognized codec is skipped during
//!   negotiation, never fatal.
//! - [`rtp::RtpPacket`] — fixed-header parsing (RFC 3550 §5.1).
//! - [`TimeBase`] — rebases raw 32-bit RTP timestamps onto a per-leg
//!   microsecond presentation clock.

pub mod rtp;

/// Codecs this client will accept during negotiation.
///
/// | Codec | SDP encoding name | RFC |
/// |-------|-------------------|-----|
/// | H.264 | `H264`            | [RFC 6184](https://tools.ietf.org/html/rfc6184) |
/// | H.265 | `H265`            | [RFC 7798](https://tools.ietf.org/html/rfc7798) |
/// | MJPEG | `JPEG`            | [RFC 2435](https://tools.ietf.org/html/rfc2435) |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
    Mjpeg,
}

impl Codec {
    /// Match an SDP `a=rtpmap` encoding name (case-insensitive, per RFC
    /// 8866 §6.6). `None` means the leg is unsupported and will be skipped.
    pub fn from_rtpmap(encoding_name: &str) -> Option<Self> {
        if encoding_name.eq_ignore_ascii_case("H264") {
            Some(Self::H264)
        } else if encoding_name.eq_ignore_ascii_case("H265") {
            Some(Self::H265)
        } else if encoding_name.eq_ignore_ascii_case("JPEG") {
            Some(Self::Mjpeg)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Mjpeg => "JPEG",
        }
    }

    /// Default RTP clock rate when the rtpmap omits one (90 kHz for video,
    /// RFC 3551 §4).
    pub fn default_clock_rate(&self) -> u32 {
        90_000
    }
}

/// Per-leg timestamp baseline.
///
/// RTP timestamps start at a random per-stream offset (RFC 3550 §5.1), so
/// the first packet after (re)sync establishes the zero point. Arithmetic is
/// wrapping to survive the 32-bit timestamp rollover.
#[derive(Debug)]
pub struct TimeBase {
    clock_rate: u32,
    origin: Option<u32>,
}

impl TimeBase {
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate: clock_rate.max(1),
            origin: None,
        }
    }

    /// Convert a raw RTP timestamp to microseconds since this leg's origin.
    /// The first timestamp seen after a reset becomes the origin.
    pub fn to_presentation_us(&mut self, raw: u32) -> u64 {
        let origin = *self.origin.get_or_insert(raw);
        let elapsed_ticks = raw.wrapping_sub(origin) as u64;
        elapsed_ticks * 1_000_000 / self.clock_rate as u64
    }

    /// Forget the origin so post-reconnect timestamps resynchronize
    /// independently of pre-reconnect values.
    pub fn reset(&mut self) {
        self.origin = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_supported_codecs() {
        assert_eq!(Codec::from_rtpmap("H264"), Some(Codec::H264));
        assert_eq!(Codec::from_rtpmap("h264"), Some(Codec::H264));
        assert_eq!(Codec::from_rtpmap("H265"), Some(Codec::H265));
        assert_eq!(Codec::from_rtpmap("JPEG"), Some(Codec::Mjpeg));
        assert_eq!(Codec::from_rtpmap("opus"), None);
        assert_eq!(Codec::from_rtpmap("MP4V-ES"), None);
    }

    #[test]
    fn timebase_rebases_first_timestamp_to_zero() {
        let mut tb = TimeBase::new(90_000);
        assert_eq!(tb.to_presentation_us(450_000), 0);
        // one second of 90 kHz ticks later
        assert_eq!(tb.to_presentation_us(540_000), 1_000_000);
    }

    #[test]
    fn timebase_survives_wraparound() {
        let mut tb = TimeBase::new(90_000);
        tb.to_presentation_us(u32::MAX - 44_999);
        // 90_000 ticks later, wrapping through zero: exactly one second.
        assert_eq!(tb.to_presentation_us(45_000), 1_000_000);
    }

    #[test]
    fn timebase_reset_establishes_new_origin() {
        let mut tb = TimeBase::new(90_000);
        tb.to_presentation_us(1_000_000);
        tb.reset();
        assert_eq!(tb.to_presentation_us(7_777_777), 0);
    }
}
