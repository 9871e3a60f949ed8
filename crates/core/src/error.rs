//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur inside the RTSP client library.
///
/// These are the library-internal failure modes. Command results seen by
/// callers are [`CommandOutcome`](crate::command::CommandOutcome) values,
/// not errors: the protocol engine translates every transport and protocol
/// failure into an outcome (or a sentinel frame push) before it reaches a
/// caller thread.
///
/// - **Transport**: [`Io`](Self::Io) — socket/network failures.
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP/SDP/RTP data.
/// - **Client**: [`Closed`](Self::Closed), [`NoTransport`](Self::NoTransport),
///   [`Unsupported`](Self::Unsupported).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a protocol message (RTSP response, SDP, or RTP).
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The engine thread has already shut down.
    #[error("client closed")]
    Closed,

    /// A request was issued before any transport was connected.
    #[error("no transport connected")]
    NoTransport,

    /// The server requires a feature this client does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Specific kind of protocol parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyResponse,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The SDP body was missing required lines or malformed.
    InvalidSdp,
    /// An RTP packet was too short or had the wrong version.
    InvalidRtp,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidSdp => write!(f, "invalid session description"),
            Self::InvalidRtp => write!(f, "invalid RTP packet"),
        }
    }
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
