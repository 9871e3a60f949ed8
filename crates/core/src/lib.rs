//! Resilient RTSP client library.
//!
//! Negotiates sessions against an RTSP source, manages their lifecycle
//! (open, play, stop, reconnect) and delivers received RTP payload to
//! independent per-leg consumer queues. A single engine thread owns all
//! protocol and timer state; caller threads interact only through commands
//! and frame queues.
//!
//! ```no_run
//! use rtsp_client::{Client, ClientConfig, CommandOutcome};
//!
//! let client = Client::new(ClientConfig::default());
//! if client.open("rtsp://cam.local/stream", None).wait() == CommandOutcome::Success {
//!     client.play().wait();
//!     for stream in client.streams() {
//!         std::thread::spawn(move || {
//!             loop {
//!                 let frame = stream.reader.pop();
//!                 if frame.is_end_of_stream() {
//!                     break;
//!                 }
//!                 // hand frame.payload to a decoder
//!             }
//!         });
//!     }
//! }
//! ```

pub mod client;
pub mod command;
pub mod engine;
pub mod error;
pub mod frame;
pub mod media;
pub mod protocol;
pub mod session;
pub mod timer;
pub mod transport;

pub use client::{Client, ClientConfig, MediaStream};
pub use command::{CommandOutcome, CommandTicket, Credentials};
pub use error::{ClientError, Result};
pub use frame::{Frame, StreamReader};
pub use media::Codec;
pub use session::SessionState;
pub use transport::{Connector, RtspTransport, TransportEvent, TransportMode};
