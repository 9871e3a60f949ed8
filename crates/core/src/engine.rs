//! The protocol engine: one thread, one cooperative loop.
//!
//! Every piece of protocol and timer state is owned by this thread, which is
//! the invariant that keeps the session controller lock-free. Each iteration
//! non-blockingly does three things, in order:
//!
//! 1. drain queued commands (strict FIFO, never two at once),
//! 2. fire due watchdogs,
//! 3. service ready transport events,
//!
//! then parks on the gateway until the earliest watchdog deadline — bounded
//! by a short poll tick while a transport is open, since socket readiness
//! has no wakeup hooked into the gateway condvar.

use std::time::{Duration, Instant};

use crate::command::{CommandOutcome, Gateway};
use crate::session::controller::Controller;

/// Park bound while a transport needs polling.
const POLL_TICK: Duration = Duration::from_millis(5);
/// Park bound while fully idle (commands wake the condvar directly).
const IDLE_TICK: Duration = Duration::from_millis(250);

pub struct Engine {
    gateway: Gateway,
    controller: Controller,
}

impl Engine {
    pub fn new(gateway: Gateway, controller: Controller) -> Self {
        Self {
            gateway,
            controller,
        }
    }

    /// The engine thread body. Returns once Shutdown has been processed;
    /// the gateway is closed on the way out so late submissions resolve
    /// `Closed` instead of hanging.
    pub fn run(mut self) {
        tracing::debug!("engine started");
        'outer: loop {
            let mut commands = self.gateway.drain().into_iter();
            while let Some(command) = commands.next() {
                if !self.controller.handle_command(command) {
                    // Commands queued behind Shutdown still get an answer.
                    for late in commands {
                        late.ticket.resolve(CommandOutcome::Closed);
                    }
                    break 'outer;
                }
            }

            let now = Instant::now();
            self.controller.run_watchdogs(now);
            self.controller.poll_network();

            let tick = if self.controller.has_transport() {
                POLL_TICK
            } else {
                IDLE_TICK
            };
            let mut deadline = Instant::now() + tick;
            if let Some(next) = self.controller.next_watchdog_deadline() {
                deadline = deadline.min(next);
            }
            self.gateway.wait_for_work(deadline);
        }
        self.gateway.close();
        tracing::debug!("engine exited");
    }
}
