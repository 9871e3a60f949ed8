//! Inbound RTSP response parsing (RFC 2326 §7).
//!
//! ```text
//! RTSP/1.0 200 OK\r\n
//! CSeq: 1\r\n
//! Content-Type: application/sdp\r\n
//! Content-Length: 142\r\n
//! \r\n
//! v=0\r\n...
//! ```
//!
//! Header lookup is case-insensitive per RFC 2326 §4.2. The body, when
//! present, is delimited by `Content-Length` and carried as raw text.

use crate::error::{ClientError, ParseErrorKind, Result};

/// A parsed RTSP response.
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub reason: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    /// Parse a complete response: status line, headers, blank line, body.
    pub fn parse(raw: &str) -> Result<Self> {
        let (head, rest) = match raw.split_once("\r\n\r\n") {
            Some((head, rest)) => (head, rest),
            None => (raw.trim_end_matches(['\r', '\n']), ""),
        };

        let mut lines = head.lines();
        let status_line = lines.next().filter(|l| !l.is_empty()).ok_or(ClientError::Parse {
            kind: ParseErrorKind::EmptyResponse,
        })?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        let code = parts.next().ok_or(ClientError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        })?;
        let reason = parts.next().unwrap_or("").to_string();

        if !version.starts_with("RTSP/") {
            return Err(ClientError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        }
        let status_code: u16 = code.parse().map_err(|_| ClientError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        })?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let colon_pos = line.find(':').ok_or(ClientError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        let body = if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        };

        Ok(RtspResponse {
            status_code,
            reason,
            headers,
            body,
        })
    }

    /// Whether the status is 2xx.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Look up a header value by name (case-insensitive, RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The CSeq echoed by the server, matching request to response.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// Session ID from the `Session` header, with any `;timeout=` suffix
    /// stripped (RFC 2326 §12.37).
    pub fn session_id(&self) -> Option<String> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
    }

    /// Session timeout from `Session: ID;timeout=N`, when present.
    pub fn timeout_secs(&self) -> Option<u64> {
        self.get_header("Session")?
            .split(';')
            .find_map(|part| part.trim().strip_prefix("timeout="))
            .and_then(|v| v.trim().parse().ok())
    }

    /// Declared body length, when the server sent one.
    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ok_response() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 2\r\nServer: test\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.reason, "OK");
        assert!(resp.is_ok());
        assert_eq!(resp.cseq(), Some(2));
        assert!(resp.body.is_none());
    }

    #[test]
    fn parse_response_with_body() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nv=0\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.content_length(), Some(5));
        assert_eq!(resp.body.as_deref(), Some("v=0\r\n"));
    }

    #[test]
    fn parse_error_status() {
        let raw = "RTSP/1.0 454 Session Not Found\r\nCSeq: 9\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.status_code, 454);
        assert_eq!(resp.reason, "Session Not Found");
        assert!(!resp.is_ok());
    }

    #[test]
    fn session_header_strips_timeout() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 0123ABCD;timeout=30\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.session_id().as_deref(), Some("0123ABCD"));
        assert_eq!(resp.timeout_secs(), Some(30));
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = "RTSP/1.0 200 OK\r\ncseq: 7\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.get_header("CSeq"), Some("7"));
        assert_eq!(resp.get_header("CSEQ"), Some("7"));
    }

    #[test]
    fn rejects_empty_and_invalid() {
        assert!(RtspResponse::parse("").is_err());
        assert!(RtspResponse::parse("HTTP/1.1 200 OK\r\n\r\n").is_err());
        assert!(RtspResponse::parse("RTSP/1.0 banana\r\n\r\n").is_err());
    }
}
