//! Client-side RTSP protocol messages (RFC 2326) and SDP parsing (RFC 8866).
//!
//! - [`request`] — outbound request construction and serialization.
//! - [`response`] — inbound response parsing.
//! - [`sdp`] — session-description parsing into candidate stream legs.

pub mod request;
pub mod response;
pub mod sdp;

pub use request::RtspRequest;
pub use response::RtspResponse;
pub use sdp::SessionDescription;
