//! Cross-thread command submission (the command gateway).
//!
//! Caller threads never touch protocol or session state directly. They
//! submit a [`CommandOp`] through the [`Gateway`] and block (or poll) on the
//! returned [`CommandTicket`]. The engine thread is the only consumer of the
//! queue: it drains commands in strict FIFO submission order and resolves
//! each ticket exactly once.
//!
//! ```text
//! caller thread            gateway              engine thread
//!   submit(op) ──────▶ Mutex<VecDeque> ──────▶ drain() in FIFO order
//!   ticket.wait() ◀─────────────────────────── ticket.resolve(outcome)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Credentials for the `Authorization: Basic` header.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Operations a caller can submit to the engine.
#[derive(Debug, Clone)]
pub enum CommandOp {
    /// Negotiate a session against the given `rtsp://` target.
    Open {
        target: String,
        credentials: Option<Credentials>,
    },
    /// Start playback of a negotiated session.
    Play,
    /// Tear the session down and return to the resting state.
    Stop,
    /// Renegotiate the current session with position recovery.
    Reconnect,
    /// Stop, then terminate the engine thread. Always succeeds.
    Shutdown,
}

impl CommandOp {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Play => "play",
            Self::Stop => "stop",
            Self::Reconnect => "reconnect",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Result of a submitted command, delivered through its ticket.
///
/// One variant per failure mode of the command surface; `WrongState` is
/// returned for every `(opcode, state)` pair outside the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// The command is not valid in the current session state.
    WrongState,
    /// The transport could not be created or connected at all.
    ClientCreateFailed,
    /// The server did not answer the session-description request.
    ServerNotReachable,
    /// Negotiation failed after the server was reached.
    NegotiationFailed,
    /// The session description could not be parsed.
    SessionDescriptionInvalid,
    /// Every candidate leg was skipped or failed setup.
    NoUsableLegs,
    /// The playback-start request was refused.
    PlayFailed,
    /// A reconnect attempt failed to renegotiate.
    ReconnectFailed,
    /// The engine had already shut down when the command was submitted.
    Closed,
}

struct TicketInner {
    outcome: Mutex<Option<CommandOutcome>>,
    resolved: Condvar,
}

/// Single-assignment result future for one submitted command.
///
/// Resolved exactly once by the engine thread; [`wait`](Self::wait) blocks
/// until then. Cloning shares the same slot (the engine keeps one clone to
/// resolve while the caller holds the other).
#[derive(Clone)]
pub struct CommandTicket {
    inner: Arc<TicketInner>,
}

impl CommandTicket {
    fn pending() -> Self {
        Self {
            inner: Arc::new(TicketInner {
                outcome: Mutex::new(None),
                resolved: Condvar::new(),
            }),
        }
    }

    /// A ticket that is already resolved (used for `Closed` fast-fail).
    fn resolved_with(outcome: CommandOutcome) -> Self {
        Self {
            inner: Arc::new(TicketInner {
                outcome: Mutex::new(Some(outcome)),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Resolve the ticket. The first call wins; later calls are ignored so a
    /// superseded resolution path (e.g. shutdown racing a response) cannot
    /// overwrite the delivered outcome.
    pub(crate) fn resolve(&self, outcome: CommandOutcome) {
        let mut slot = self.inner.outcome.lock();
        if slot.is_some() {
            tracing::trace!(?outcome, "ticket already resolved, ignoring");
            return;
        }
        *slot = Some(outcome);
        self.inner.resolved.notify_all();
    }

    /// Block the calling thread until the engine resolves this command.
    pub fn wait(&self) -> CommandOutcome {
        let mut slot = self.inner.outcome.lock();
        loop {
            if let Some(outcome) = *slot {
                return outcome;
            }
            self.inner.resolved.wait(&mut slot);
        }
    }

    /// Non-blocking poll.
    pub fn try_outcome(&self) -> Option<CommandOutcome> {
        *self.inner.outcome.lock()
    }
}

/// One queued command: the operation plus the ticket to resolve.
pub struct Command {
    pub op: CommandOp,
    pub ticket: CommandTicket,
}

struct GatewayInner {
    queue: Mutex<GatewayQueue>,
    work: Condvar,
}

struct GatewayQueue {
    commands: VecDeque<Command>,
    closed: bool,
}

/// Thread-safe FIFO between caller threads and the engine thread.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                queue: Mutex::new(GatewayQueue {
                    commands: VecDeque::new(),
                    closed: false,
                }),
                work: Condvar::new(),
            }),
        }
    }

    /// Submit a command from any thread. Never blocks beyond the enqueue.
    ///
    /// If the engine has already shut down, nothing is enqueued and the
    /// returned ticket is pre-resolved with [`CommandOutcome::Closed`].
    pub fn submit(&self, op: CommandOp) -> CommandTicket {
        let mut queue = self.inner.queue.lock();
        if queue.closed {
            tracing::debug!(op = op.name(), "submit after close");
            return CommandTicket::resolved_with(CommandOutcome::Closed);
        }
        let ticket = CommandTicket::pending();
        queue.commands.push_back(Command {
            op,
            ticket: ticket.clone(),
        });
        self.inner.work.notify_one();
        ticket
    }

    /// Drain all queued commands in submission order. Engine thread only.
    pub(crate) fn drain(&self) -> Vec<Command> {
        let mut queue = self.inner.queue.lock();
        queue.commands.drain(..).collect()
    }

    /// Park the engine thread until a command arrives or `deadline` passes.
    /// Returns immediately if the queue is non-empty.
    pub(crate) fn wait_for_work(&self, deadline: Instant) {
        let mut queue = self.inner.queue.lock();
        while queue.commands.is_empty() {
            if self
                .inner
                .work
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                break;
            }
        }
    }

    /// Close the gateway: reject future submissions and resolve anything
    /// still queued with `Closed`. Called by the engine during shutdown.
    pub(crate) fn close(&self) {
        let leftover = {
            let mut queue = self.inner.queue.lock();
            queue.closed = true;
            queue.commands.drain(..).collect::<Vec<_>>()
        };
        for command in leftover {
            command.ticket.resolve(CommandOutcome::Closed);
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
