//! Client-side session state (RFC 2326 §3).
//!
//! A [`Session`] is created when an Open command is accepted and destroyed
//! on any transition back to [`SessionState::Initial`]. It is owned
//! exclusively by the [`controller`] and mutated only on the engine thread —
//! caller threads reach it strictly through commands, which is what makes
//! the state machine safe without locking.
//!
//! ## Lifecycle
//!
//! ```text
//! Open        Initial      -> Negotiating
//! [nego ok]   Negotiating  -> ReadyToPlay   (-> Playing on reconnect)
//! [nego err]  Negotiating  -> Initial
//! Play        ReadyToPlay  -> Playing
//! Reconnect   Playing      -> Reconnecting -> Negotiating
//! Stop        ReadyToPlay | Playing | Reconnecting -> Initial
//! Shutdown    any          -> Initial, engine exits
//! ```

pub mod controller;

use crate::command::Credentials;
use crate::frame::FrameSink;
use crate::media::{Codec, TimeBase};

/// Session lifecycle states. `Initial` is both the starting and the resting
/// state between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Initial = 0,
    Negotiating = 1,
    ReadyToPlay = 2,
    Playing = 3,
    Reconnecting = 4,
}

impl SessionState {
    /// Decode a published state snapshot.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Negotiating,
            2 => Self::ReadyToPlay,
            3 => Self::Playing,
            4 => Self::Reconnecting,
            _ => Self::Initial,
        }
    }
}

/// Default keep-alive interval when the server sends no `timeout=`
/// (RFC 2326 §12.37).
pub const DEFAULT_KEEPALIVE_SECS: u64 = 60;

/// One accepted, independently negotiated elementary stream.
pub struct StreamLeg {
    pub codec: Codec,
    /// Media kind from the SDP m= line (`video`, `audio`, ...).
    pub kind: String,
    /// Resolved control URI used for this leg's SETUP.
    pub control: String,
    /// Index of the originating candidate in the session description, used
    /// to re-match this leg to its queue across a reconnect.
    pub candidate_index: usize,
    /// Producer half of the leg's consumer queue.
    pub sink: FrameSink,
    /// Rebases raw RTP timestamps onto the presentation clock.
    pub time_base: TimeBase,
    /// Cumulative packets received, sampled by the gap watchdog.
    pub packets_received: u64,
}

/// One pending-or-active negotiated connection.
pub struct Session {
    /// Target address, reused verbatim on reconnect.
    pub target: String,
    pub credentials: Option<Credentials>,
    /// Server-assigned session identifier from the first accepted SETUP.
    pub session_id: Option<String>,
    /// Base URI for control resolution (Content-Base or the target).
    pub base_uri: String,
    pub legs: Vec<StreamLeg>,
    /// Current initial-seek offset in seconds; advanced by reconnect
    /// position recovery so playback never repeats consumed content.
    pub start_offset_secs: f64,
    /// Finite presentation duration, when the description declares one.
    pub duration_secs: Option<f64>,
    /// Keep-alive interval granted by the server.
    pub keepalive_secs: u64,
    /// Packet total at the previous gap-watchdog sample.
    pub last_gap_sample: u64,
}

impl Session {
    pub fn new(target: String, credentials: Option<Credentials>, start_offset_secs: f64) -> Self {
        let base_uri = target.clone();
        Self {
            target,
            credentials,
            session_id: None,
            base_uri,
            legs: Vec::new(),
            start_offset_secs,
            duration_secs: None,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            last_gap_sample: 0,
        }
    }

    /// Cumulative packets received across all legs.
    pub fn total_packets(&self) -> u64 {
        self.legs.iter().map(|leg| leg.packets_received).sum()
    }

    /// Remaining playback time in seconds, for the session-duration timer.
    pub fn remaining_secs(&self) -> Option<f64> {
        self.duration_secs
            .map(|d| (d - self.start_offset_secs).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_snapshot_round_trips() {
        for state in [
            SessionState::Initial,
            SessionState::Negotiating,
            SessionState::ReadyToPlay,
            SessionState::Playing,
            SessionState::Reconnecting,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn remaining_time_accounts_for_seek_offset() {
        let mut session = Session::new("rtsp://cam.local/s".into(), None, 10.0);
        assert!(session.remaining_secs().is_none(), "live session no duration");

        session.duration_secs = Some(30.0);
        assert_eq!(session.remaining_secs(), Some(20.0));

        session.start_offset_secs = 45.0;
        assert_eq!(session.remaining_secs(), Some(0.0), "never negative");
    }
}
