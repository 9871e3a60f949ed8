//! Watchdog timers for the protocol engine.
//!
//! The engine owns one [`Watchdogs`] set. Tasks are armed, rescheduled, and
//! cancelled exclusively on the engine thread, so no locking is needed.
//!
//! Cancellation uses per-kind generation counters instead of removing heap
//! entries: `cancel` bumps the kind's generation, and an entry whose stamped
//! generation no longer matches is skipped at fire time. A watchdog
//! superseded by a state transition is therefore a guaranteed no-op even
//! though its heap entry still exists.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// The watchdog kinds the session controller uses.
///
/// At any instant the armed set must be exactly the set prescribed for the
/// current session state: `DescribeTimeout` only while a DESCRIBE round trip
/// is pending, `GapCheck`/`KeepAlive`/`SessionEnd` only while playing, and
/// `AutoReconnect` only between failed attempts under the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogKind {
    /// The session-description request got no response in time.
    DescribeTimeout,
    /// Periodic packet-arrival sampling to detect a silently dead session.
    GapCheck,
    /// Periodic no-op request to keep the server-side session alive.
    KeepAlive,
    /// Fires once at the expected end of a finite-duration session.
    SessionEnd,
    /// Delayed internal retry under the auto-reconnect policy.
    AutoReconnect,
}

const KIND_COUNT: usize = 5;

impl WatchdogKind {
    fn index(self) -> usize {
        match self {
            Self::DescribeTimeout => 0,
            Self::GapCheck => 1,
            Self::KeepAlive => 2,
            Self::SessionEnd => 3,
            Self::AutoReconnect => 4,
        }
    }
}

#[derive(PartialEq, Eq)]
struct Entry {
    deadline: Instant,
    kind: WatchdogKind,
    generation: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The engine's set of armed watchdog tasks.
pub struct Watchdogs {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Current generation per kind. An entry is live iff its stamp matches.
    generations: [u64; KIND_COUNT],
    /// Whether the kind's current generation has an entry in the heap.
    armed: [bool; KIND_COUNT],
}

impl Watchdogs {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            generations: [0; KIND_COUNT],
            armed: [false; KIND_COUNT],
        }
    }

    /// Arm (or re-arm) a watchdog to fire after `delay`. Re-arming replaces
    /// the previous schedule for the same kind.
    pub fn arm(&mut self, kind: WatchdogKind, delay: Duration) {
        let idx = kind.index();
        self.generations[idx] += 1;
        self.armed[idx] = true;
        self.heap.push(Reverse(Entry {
            deadline: Instant::now() + delay,
            kind,
            generation: self.generations[idx],
        }));
        tracing::trace!(?kind, ?delay, "watchdog armed");
    }

    /// Cancel a watchdog. Any pending heap entry becomes a no-op.
    pub fn cancel(&mut self, kind: WatchdogKind) {
        let idx = kind.index();
        if self.armed[idx] {
            self.generations[idx] += 1;
            self.armed[idx] = false;
            tracing::trace!(?kind, "watchdog cancelled");
        }
    }

    /// Cancel every armed watchdog (session teardown).
    pub fn cancel_all(&mut self) {
        for idx in 0..KIND_COUNT {
            if self.armed[idx] {
                self.generations[idx] += 1;
                self.armed[idx] = false;
            }
        }
        self.heap.clear();
    }

    /// Whether the kind is currently armed.
    pub fn is_armed(&self, kind: WatchdogKind) -> bool {
        self.armed[kind.index()]
    }

    /// Number of armed watchdogs.
    pub fn armed_count(&self) -> usize {
        self.armed.iter().filter(|a| **a).count()
    }

    /// Pop every watchdog due at `now`, in deadline order, skipping stale
    /// entries. Fired kinds are disarmed; a periodic watchdog re-arms itself
    /// from its handler.
    pub fn pop_due(&mut self, now: Instant) -> Vec<WatchdogKind> {
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.deadline > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            let idx = entry.kind.index();
            if entry.generation != self.generations[idx] {
                continue; // superseded
            }
            self.armed[idx] = false;
            due.push(entry.kind);
        }
        due
    }

    /// Earliest live deadline, for the engine's park timeout.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.generation == self.generations[entry.kind.index()] {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
        None
    }
}

impl Default for Watchdogs {
    fn default() -> Self {
        Self::new()
    }
}
