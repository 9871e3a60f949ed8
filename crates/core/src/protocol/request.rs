//! Outbound RTSP request construction (RFC 2326 §6).
//!
//! Requests follow HTTP/1.1 syntax:
//!
//! ```text
//! Method SP Request-URI SP RTSP-Version CRLF
//! *(Header: Value CRLF)
//! CRLF
//! ```
//!
//! Uses a builder pattern — chain [`add_header`](RtspRequest::add_header)
//! and friends, then call [`serialize`](RtspRequest::serialize). `CSeq` and
//! `User-Agent` are set on every request.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::command::Credentials;

/// Client identification string sent in every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = "rtsp-client/0.1";

/// An outbound RTSP request.
#[must_use]
#[derive(Debug)]
pub struct RtspRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    pub fn new(method: &str, uri: &str, cseq: u32) -> Self {
        RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: vec![
                ("CSeq".to_string(), cseq.to_string()),
                ("User-Agent".to_string(), USER_AGENT.to_string()),
            ],
        }
    }

    /// DESCRIBE — request the session description (RFC 2326 §10.2).
    pub fn describe(uri: &str, cseq: u32) -> Self {
        Self::new("DESCRIBE", uri, cseq).add_header("Accept", "application/sdp")
    }

    /// SETUP — negotiate one stream leg (RFC 2326 §10.4).
    pub fn setup(control_uri: &str, cseq: u32, transport_spec: &str) -> Self {
        Self::new("SETUP", control_uri, cseq).add_header("Transport", transport_spec)
    }

    /// PLAY — start delivery from `start_secs` into the presentation
    /// (RFC 2326 §10.5).
    pub fn play(uri: &str, cseq: u32, session_id: &str, start_secs: f64) -> Self {
        Self::new("PLAY", uri, cseq)
            .add_header("Session", session_id)
            .add_header("Range", &format!("npt={:.3}-", start_secs))
    }

    /// TEARDOWN — release the session (RFC 2326 §10.7).
    pub fn teardown(uri: &str, cseq: u32, session_id: &str) -> Self {
        Self::new("TEARDOWN", uri, cseq).add_header("Session", session_id)
    }

    /// GET_PARAMETER with no body, used as a keep-alive (RFC 2326 §10.8).
    pub fn keep_alive(uri: &str, cseq: u32, session_id: &str) -> Self {
        Self::new("GET_PARAMETER", uri, cseq).add_header("Session", session_id)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach `Authorization: Basic` credentials (RFC 2617 §2).
    pub fn with_credentials(self, credentials: Option<&Credentials>) -> Self {
        match credentials {
            Some(c) => {
                let token = BASE64.encode(format!("{}:{}", c.username, c.password));
                self.add_header("Authorization", &format!("Basic {}", token))
            }
            None => self,
        }
    }

    /// The CSeq this request was built with.
    pub fn cseq(&self) -> u32 {
        self.headers
            .iter()
            .find(|(name, _)| name == "CSeq")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0)
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_describe() {
        let req = RtspRequest::describe("rtsp://cam.local/stream", 1);
        let s = req.serialize();
        assert!(s.starts_with("DESCRIBE rtsp://cam.local/stream RTSP/1.0\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("User-Agent: rtsp-client/0.1\r\n"));
        assert!(s.contains("Accept: application/sdp\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn play_includes_session_and_range() {
        let req = RtspRequest::play("rtsp://cam.local/stream", 4, "ABCD", 12.5);
        let s = req.serialize();
        assert!(s.contains("Session: ABCD\r\n"));
        assert!(s.contains("Range: npt=12.500-\r\n"));
    }

    #[test]
    fn basic_credentials_are_base64_encoded() {
        let creds = Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let req =
            RtspRequest::describe("rtsp://cam.local/stream", 2).with_credentials(Some(&creds));
        // base64("user:pass")
        assert!(
            req.serialize()
                .contains("Authorization: Basic dXNlcjpwYXNz\r\n")
        );
    }

    #[test]
    fn no_credentials_no_authorization_header() {
        let req = RtspRequest::describe("rtsp://cam.local/stream", 3).with_credentials(None);
        assert!(!req.serialize().contains("Authorization"));
    }

    #[test]
    fn cseq_round_trips() {
        assert_eq!(RtspRequest::describe("rtsp://x/y", 42).cseq(), 42);
    }
}
