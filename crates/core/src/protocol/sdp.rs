//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Parses the DESCRIBE response body into candidate stream legs:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 123 1 IN IP4 10.0.0.5                    ← origin
//! s=Stream                                     ← session name
//! t=0 0                                        ← timing
//! a=range:npt=0-30.0                           ← playback range (§5.18)
//! a=control:*                                  ← session control URL
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec / clock rate
//! a=control:track1                             ← leg control URL
//! ```
//!
//! Each `m=` section becomes one [`MediaCandidate`], in description order.
//! Codec support is checked later during negotiation, so a description full
//! of exotic codecs still parses — it just yields no usable legs.

use crate::error::{ClientError, ParseErrorKind, Result};

/// One candidate stream leg from an `m=` section.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    /// Media kind from the m= line (`video`, `audio`, ...).
    pub kind: String,
    /// RTP payload type from the m= line format list.
    pub payload_type: u8,
    /// Encoding name from `a=rtpmap` (e.g. `H264`). Empty when absent.
    pub encoding: String,
    /// RTP clock rate from `a=rtpmap`, 0 when absent.
    pub clock_rate: u32,
    /// Control URI, resolved against the session base.
    pub control: String,
}

/// A parsed session description.
#[derive(Debug)]
pub struct SessionDescription {
    pub candidates: Vec<MediaCandidate>,
    /// Finite presentation duration from `a=range:npt=S-E`, in seconds.
    /// `None` for live/unbounded sessions.
    pub duration_secs: Option<f64>,
}

impl SessionDescription {
    /// Parse an SDP body. `base_uri` (the Content-Base or request URI) is
    /// used to resolve relative `a=control` values.
    pub fn parse(body: &str, base_uri: &str) -> Result<Self> {
        if !body.lines().any(|l| l.trim() == "v=0") {
            return Err(ClientError::Parse {
                kind: ParseErrorKind::InvalidSdp,
            });
        }

        let mut candidates: Vec<MediaCandidate> = Vec::new();
        let mut duration_secs = None;
        let mut in_media = false;

        for line in body.lines() {
            let line = line.trim_end();
            if let Some(media) = line.strip_prefix("m=") {
                let mut parts = media.split_whitespace();
                let kind = parts.next().unwrap_or("").to_string();
                let _port = parts.next();
                let _proto = parts.next();
                let payload_type = parts.next().and_then(|pt| pt.parse().ok()).unwrap_or(0);
                candidates.push(MediaCandidate {
                    kind,
                    payload_type,
                    encoding: String::new(),
                    clock_rate: 0,
                    control: base_uri.to_string(),
                });
                in_media = true;
            } else if let Some(attr) = line.strip_prefix("a=") {
                if in_media {
                    let Some(candidate) = candidates.last_mut() else {
                        continue;
                    };
                    if let Some(rtpmap) = attr.strip_prefix("rtpmap:") {
                        // rtpmap:<pt> <encoding>/<clock>[/<channels>]
                        let mut parts = rtpmap.split_whitespace();
                        let pt: u8 = parts
                            .next()
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(u8::MAX);
                        if pt == candidate.payload_type
                            && let Some(spec) = parts.next()
                        {
                            let mut spec = spec.split('/');
                            candidate.encoding = spec.next().unwrap_or("").to_string();
                            candidate.clock_rate =
                                spec.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                        }
                    } else if let Some(control) = attr.strip_prefix("control:") {
                        candidate.control = resolve_control(base_uri, control.trim());
                    }
                } else if let Some(range) = attr.strip_prefix("range:") {
                    duration_secs = parse_npt_duration(range.trim());
                }
            }
        }

        tracing::debug!(
            candidates = candidates.len(),
            ?duration_secs,
            "session description parsed"
        );

        Ok(SessionDescription {
            candidates,
            duration_secs,
        })
    }
}

/// Resolve an `a=control` value against the session base URI (RFC 2326
/// §C.1.1): absolute URLs pass through, `*` means the base itself, anything
/// else is appended as a path segment.
fn resolve_control(base: &str, control: &str) -> String {
    if control.starts_with("rtsp://") || control.starts_with("rtsps://") {
        control.to_string()
    } else if control == "*" || control.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), control)
    }
}

/// Extract a finite duration from `npt=S-E` (RFC 2326 §3.6). Open-ended
/// (`npt=0-`) and `now-` ranges yield `None`.
fn parse_npt_duration(range: &str) -> Option<f64> {
    let npt = range.strip_prefix("npt=")?;
    let (start, end) = npt.split_once('-')?;
    let start: f64 = start.trim().parse().unwrap_or(0.0);
    let end: f64 = end.trim().parse().ok()?;
    if end > start { Some(end - start) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "rtsp://cam.local/stream";

    fn two_leg_sdp() -> String {
        [
            "v=0",
            "o=- 123 1 IN IP4 10.0.0.5",
            "s=Stream",
            "t=0 0",
            "a=control:*",
            "m=video 0 RTP/AVP 96",
            "a=rtpmap:96 H264/90000",
            "a=control:track1",
            "m=audio 0 RTP/AVP 97",
            "a=rtpmap:97 opus/48000",
            "a=control:track2",
            "",
        ]
        .join("\r\n")
    }

    #[test]
    fn parses_media_sections_in_order() {
        let sd = SessionDescription::parse(&two_leg_sdp(), BASE).unwrap();
        assert_eq!(sd.candidates.len(), 2);

        let video = &sd.candidates[0];
        assert_eq!(video.kind, "video");
        assert_eq!(video.payload_type, 96);
        assert_eq!(video.encoding, "H264");
        assert_eq!(video.clock_rate, 90_000);
        assert_eq!(video.control, "rtsp://cam.local/stream/track1");

        let audio = &sd.candidates[1];
        assert_eq!(audio.encoding, "opus");
        assert_eq!(audio.control, "rtsp://cam.local/stream/track2");
    }

    #[test]
    fn absolute_control_passes_through() {
        let sdp = "v=0\r\nm=video 0 RTP/AVP 96\r\na=control:rtsp://other/track9\r\n";
        let sd = SessionDescription::parse(sdp, BASE).unwrap();
        assert_eq!(sd.candidates[0].control, "rtsp://other/track9");
    }

    #[test]
    fn missing_control_falls_back_to_base() {
        let sdp = "v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n";
        let sd = SessionDescription::parse(sdp, BASE).unwrap();
        assert_eq!(sd.candidates[0].control, BASE);
    }

    #[test]
    fn finite_range_yields_duration() {
        let sdp = "v=0\r\na=range:npt=0-30.5\r\nm=video 0 RTP/AVP 96\r\n";
        let sd = SessionDescription::parse(sdp, BASE).unwrap();
        assert_eq!(sd.duration_secs, Some(30.5));
    }

    #[test]
    fn open_ended_range_is_live() {
        let sdp = "v=0\r\na=range:npt=0-\r\nm=video 0 RTP/AVP 96\r\n";
        let sd = SessionDescription::parse(sdp, BASE).unwrap();
        assert!(sd.duration_secs.is_none());
    }

    #[test]
    fn rejects_body_without_version() {
        assert!(SessionDescription::parse("hello\r\n", BASE).is_err());
    }

    #[test]
    fn no_media_sections_is_valid_but_empty() {
        let sd = SessionDescription::parse("v=0\r\ns=Empty\r\n", BASE).unwrap();
        assert!(sd.candidates.is_empty());
    }
}
