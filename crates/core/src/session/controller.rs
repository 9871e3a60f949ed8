//! The session controller: lifecycle state machine, negotiation sequencing,
//! and reconnect/position-recovery policy.
//!
//! Everything here runs on the engine thread. Network round trips never
//! block it: a request is sent, the expected reply is recorded in
//! [`Pending`], and the matching response re-enters through
//! [`Controller::on_transport_event`] to drive the next step. Negotiation is
//! therefore an explicit chain — DESCRIBE, then one SETUP per usable
//! candidate, then (for reconnects) PLAY — rather than a sequence of
//! blocking calls.
//!
//! Caller-visible results are [`CommandOutcome`] values resolved into
//! command tickets; no transport or protocol error ever crosses the engine
//! boundary as an error.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::client::{ClientConfig, MediaStream};
use crate::command::{Command, CommandOp, CommandOutcome, CommandTicket, Credentials};
use crate::error::{ClientError, Result};
use crate::frame::{Frame, FrameQueue};
use crate::media::rtp::RtpPacket;
use crate::media::{Codec, TimeBase};
use crate::protocol::sdp::MediaCandidate;
use crate::protocol::{RtspRequest, RtspResponse, SessionDescription};
use crate::session::{Session, SessionState, StreamLeg};
use crate::timer::{WatchdogKind, Watchdogs};
use crate::transport::{Connector, RtspTransport, TransportEvent};

/// Events drained from the transport per engine tick, bounding one
/// iteration's work.
const MAX_EVENTS_PER_TICK: usize = 128;

/// The in-flight round trip, keyed by CSeq. At most one exists at a time;
/// responses with any other CSeq are stale and ignored.
enum Pending {
    Describe,
    Setup { candidate: usize },
    Play { ticket: Option<CommandTicket>, reconnect: bool },
    KeepAlive,
}

/// An accepted candidate awaiting its frame queue. Queues are only bound at
/// negotiation success so a failed attempt leaves no half-attached consumer
/// state behind.
struct PendingLeg {
    codec: Codec,
    kind: String,
    control: String,
    candidate_index: usize,
    clock_rate: u32,
}

/// State of one negotiation attempt (initial open or reconnect).
struct Negotiation {
    reconnect: bool,
    /// Resolved at the end of the attempt; `None` for internal retries.
    ticket: Option<CommandTicket>,
    candidates: Vec<MediaCandidate>,
    next_candidate: usize,
    accepted: Vec<PendingLeg>,
    /// On reconnect, the surviving legs whose queues are re-matched to the
    /// newly negotiated ones. Restored to the session if the attempt fails.
    previous_legs: Vec<StreamLeg>,
}

/// Owns the session lifecycle. Driven exclusively by the engine thread.
pub struct Controller {
    config: ClientConfig,
    connector: Box<dyn Connector>,
    state: SessionState,
    /// Lock-free state snapshot readable by caller threads.
    published_state: Arc<AtomicU8>,
    /// Newly negotiated consumer handles, drained by `Client::streams`.
    streams_out: Arc<Mutex<VecDeque<MediaStream>>>,
    transport: Option<Box<dyn RtspTransport>>,
    session: Option<Session>,
    watchdogs: Watchdogs,
    cseq: u32,
    pending: Option<(u32, Pending)>,
    negotiation: Option<Negotiation>,
    /// Target of the last Open, kept for the silent retry loop.
    retry_target: Option<(String, Option<Credentials>)>,
}

impl Controller {
    pub fn new(
        config: ClientConfig,
        connector: Box<dyn Connector>,
        published_state: Arc<AtomicU8>,
        streams_out: Arc<Mutex<VecDeque<MediaStream>>>,
    ) -> Self {
        Self {
            config,
            connector,
            state: SessionState::Initial,
            published_state,
            streams_out,
            transport: None,
            session: None,
            watchdogs: Watchdogs::new(),
            cseq: 0,
            pending: None,
            negotiation: None,
            retry_target: None,
        }
    }

    fn auto_reconnect_enabled(&self) -> bool {
        !self.config.auto_reconnect.is_zero()
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(old_state = ?self.state, new_state = ?state, "state transition");
            self.state = state;
            self.published_state.store(state as u8, Ordering::Release);
        }
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    fn send(&mut self, request: &RtspRequest) -> Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.send_request(request),
            None => Err(ClientError::NoTransport),
        }
    }

    // ---- command dispatch ------------------------------------------------

    /// Process one command. Returns `false` once Shutdown has been handled
    /// and the engine loop must exit.
    pub fn handle_command(&mut self, command: Command) -> bool {
        tracing::debug!(op = command.op.name(), state = ?self.state, "command");
        match command.op {
            CommandOp::Open {
                target,
                credentials,
            } => self.cmd_open(target, credentials, command.ticket),
            CommandOp::Play => self.cmd_play(command.ticket),
            CommandOp::Stop => self.cmd_stop(command.ticket),
            CommandOp::Reconnect => self.cmd_reconnect(command.ticket),
            CommandOp::Shutdown => {
                self.cmd_shutdown(command.ticket);
                return false;
            }
        }
        true
    }

    fn cmd_open(
        &mut self,
        target: String,
        credentials: Option<Credentials>,
        ticket: CommandTicket,
    ) {
        if self.state != SessionState::Initial || self.pending.is_some() {
            ticket.resolve(CommandOutcome::WrongState);
            return;
        }
        // A fresh Open supersedes any silent retry still armed.
        self.watchdogs.cancel(WatchdogKind::AutoReconnect);
        self.retry_target = Some((target.clone(), credentials.clone()));
        self.begin_open(target, credentials, Some(ticket));
    }

    fn cmd_play(&mut self, ticket: CommandTicket) {
        if self.state != SessionState::ReadyToPlay || self.pending.is_some() {
            ticket.resolve(CommandOutcome::WrongState);
            return;
        }
        self.send_play(Some(ticket), false);
    }

    fn cmd_stop(&mut self, ticket: CommandTicket) {
        if !matches!(
            self.state,
            SessionState::ReadyToPlay | SessionState::Playing | SessionState::Reconnecting
        ) {
            ticket.resolve(CommandOutcome::WrongState);
            return;
        }
        // Abandon an in-flight round trip; its future still resolves.
        if let Some((_, Pending::Play { ticket: Some(play_ticket), .. })) = self.pending.take() {
            play_ticket.resolve(CommandOutcome::PlayFailed);
        }
        self.retry_target = None;
        self.send_teardown();
        self.teardown_session();
        ticket.resolve(CommandOutcome::Success);
    }

    fn cmd_reconnect(&mut self, ticket: CommandTicket) {
        if self.state != SessionState::Playing {
            ticket.resolve(CommandOutcome::WrongState);
            return;
        }
        self.pending = None; // a pending keep-alive is superseded
        self.begin_reconnect(Some(ticket));
    }

    fn cmd_shutdown(&mut self, ticket: CommandTicket) {
        if let Some((_, pending)) = self.pending.take()
            && let Pending::Play {
                ticket: Some(play_ticket),
                ..
            } = pending
        {
            play_ticket.resolve(CommandOutcome::Closed);
        }
        self.retry_target = None;
        self.send_teardown();
        // Takes care of an in-flight negotiation too: its ticket resolves
        // `Closed` and any parked legs get their sentinel.
        self.teardown_session();
        ticket.resolve(CommandOutcome::Success);
        tracing::info!("shutdown complete");
    }

    // ---- open / negotiation ---------------------------------------------

    fn begin_open(
        &mut self,
        target: String,
        credentials: Option<Credentials>,
        ticket: Option<CommandTicket>,
    ) {
        match self.connector.connect(&target) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.session = Some(Session::new(
                    target,
                    credentials,
                    self.config.initial_seek_secs,
                ));
                self.set_state(SessionState::Negotiating);
                self.negotiation = Some(Negotiation {
                    reconnect: false,
                    ticket,
                    candidates: Vec::new(),
                    next_candidate: 0,
                    accepted: Vec::new(),
                    previous_legs: Vec::new(),
                });
                self.send_describe();
            }
            Err(error) => {
                let outcome = match error {
                    ClientError::Unsupported(_) => CommandOutcome::ClientCreateFailed,
                    _ => CommandOutcome::ServerNotReachable,
                };
                tracing::warn!(%error, ?outcome, "open: connect failed");
                if let Some(ticket) = ticket {
                    ticket.resolve(outcome);
                }
                self.arm_silent_retry();
            }
        }
    }

    fn send_describe(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let cseq = {
            let uri = session.base_uri.clone();
            let credentials = session.credentials.clone();
            let cseq = self.next_cseq();
            let request = RtspRequest::describe(&uri, cseq).with_credentials(credentials.as_ref());
            if let Err(error) = self.send(&request) {
                tracing::warn!(%error, "describe send failed");
                self.fail_negotiation(CommandOutcome::ServerNotReachable);
                return;
            }
            cseq
        };
        self.pending = Some((cseq, Pending::Describe));
        self.watchdogs
            .arm(WatchdogKind::DescribeTimeout, self.config.describe_timeout);
    }

    fn handle_describe_response(&mut self, response: RtspResponse) {
        self.watchdogs.cancel(WatchdogKind::DescribeTimeout);

        if !response.is_ok() {
            tracing::warn!(status = response.status_code, "describe rejected");
            self.fail_negotiation(CommandOutcome::NegotiationFailed);
            return;
        }
        let Some(body) = response.body.as_deref() else {
            self.fail_negotiation(CommandOutcome::SessionDescriptionInvalid);
            return;
        };

        if let Some(base) = response.get_header("Content-Base")
            && let Some(session) = self.session.as_mut()
        {
            session.base_uri = base.trim_end_matches('/').to_string();
        }
        let base_uri = match self.session.as_ref() {
            Some(session) => session.base_uri.clone(),
            None => return,
        };

        let description = match SessionDescription::parse(body, &base_uri) {
            Ok(description) => description,
            Err(error) => {
                tracing::warn!(%error, "invalid session description");
                self.fail_negotiation(CommandOutcome::SessionDescriptionInvalid);
                return;
            }
        };

        if description.candidates.is_empty() {
            self.fail_negotiation(CommandOutcome::NoUsableLegs);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.duration_secs = description.duration_secs;
        }
        if let Some(negotiation) = self.negotiation.as_mut() {
            negotiation.candidates = description.candidates;
            negotiation.next_candidate = 0;
        }
        self.advance_setup();
    }

    /// Issue SETUP for the next supported candidate, skipping unsupported
    /// ones. Falls through to [`finish_negotiation`](Self::finish_negotiation)
    /// when the candidate list is exhausted.
    fn advance_setup(&mut self) {
        loop {
            let (candidate_index, candidate) = {
                let Some(negotiation) = self.negotiation.as_mut() else {
                    return;
                };
                let index = negotiation.next_candidate;
                match negotiation.candidates.get(index) {
                    Some(candidate) => (index, candidate.clone()),
                    None => break,
                }
            };

            if Codec::from_rtpmap(&candidate.encoding).is_none() {
                tracing::info!(
                    kind = %candidate.kind,
                    encoding = %candidate.encoding,
                    "skipping unsupported codec"
                );
                self.skip_candidate();
                continue;
            }

            let leg_slot = self
                .negotiation
                .as_ref()
                .map(|n| n.accepted.len())
                .unwrap_or(0);
            let spec = match self
                .transport
                .as_mut()
                .ok_or(ClientError::NoTransport)
                .and_then(|t| t.setup_transport_spec(leg_slot))
            {
                Ok(spec) => spec,
                Err(error) => {
                    tracing::warn!(%error, "transport setup allocation failed, skipping leg");
                    self.skip_candidate();
                    continue;
                }
            };

            let (session_id, credentials) = match self.session.as_ref() {
                Some(session) => (session.session_id.clone(), session.credentials.clone()),
                None => (None, None),
            };
            let cseq = self.next_cseq();
            let mut request = RtspRequest::setup(&candidate.control, cseq, &spec)
                .with_credentials(credentials.as_ref());
            if let Some(id) = session_id {
                request = request.add_header("Session", &id);
            }
            if let Err(error) = self.send(&request) {
                tracing::warn!(%error, "setup send failed");
                self.fail_negotiation(CommandOutcome::ServerNotReachable);
                return;
            }
            self.pending = Some((cseq, Pending::Setup { candidate: candidate_index }));
            return;
        }
        self.finish_negotiation();
    }

    fn skip_candidate(&mut self) {
        if let Some(negotiation) = self.negotiation.as_mut() {
            negotiation.next_candidate += 1;
        }
    }

    fn handle_setup_response(
        &mut self,
        candidate_index: usize,
        response: RtspResponse,
    ) {
        if !response.is_ok() {
            tracing::warn!(
                status = response.status_code,
                candidate_index,
                "setup rejected, skipping leg"
            );
            self.skip_candidate();
            self.advance_setup();
            return;
        }

        if let Some(session) = self.session.as_mut() {
            if session.session_id.is_none() {
                session.session_id = response.session_id();
            }
            if let Some(timeout) = response.timeout_secs() {
                session.keepalive_secs = timeout;
            }
        }

        let leg_slot = self
            .negotiation
            .as_ref()
            .map(|n| n.accepted.len())
            .unwrap_or(0);
        if let Some(transport) = self.transport.as_mut()
            && let Err(error) = transport.bind_leg(leg_slot, response.get_header("Transport"))
        {
            tracing::warn!(%error, candidate_index, "leg bind failed, skipping");
            self.skip_candidate();
            self.advance_setup();
            return;
        }

        let Some(negotiation) = self.negotiation.as_mut() else {
            return;
        };
        let Some(candidate) = negotiation.candidates.get(candidate_index).cloned() else {
            return;
        };
        let Some(codec) = Codec::from_rtpmap(&candidate.encoding) else {
            return;
        };
        let clock_rate = if candidate.clock_rate > 0 {
            candidate.clock_rate
        } else {
            codec.default_clock_rate()
        };
        tracing::info!(
            kind = %candidate.kind,
            codec = codec.name(),
            control = %candidate.control,
            "leg accepted"
        );
        negotiation.accepted.push(PendingLeg {
            codec,
            kind: candidate.kind,
            control: candidate.control,
            candidate_index,
            clock_rate,
        });
        negotiation.next_candidate += 1;
        self.advance_setup();
    }

    /// All candidates processed: either fail with zero legs or bind queues
    /// and transition.
    fn finish_negotiation(&mut self) {
        let accepted_empty = self
            .negotiation
            .as_ref()
            .map(|n| n.accepted.is_empty())
            .unwrap_or(true);
        if accepted_empty {
            self.fail_negotiation(CommandOutcome::NoUsableLegs);
            return;
        }

        let Some(mut negotiation) = self.negotiation.take() else {
            return;
        };

        // Bind each accepted leg to a frame queue: reconnects re-match the
        // surviving queue by candidate index and codec, everything else gets
        // a fresh queue whose reader is published to the caller.
        let mut legs = Vec::with_capacity(negotiation.accepted.len());
        for pending_leg in negotiation.accepted.drain(..) {
            let previous = negotiation.previous_legs.iter().position(|leg| {
                leg.candidate_index == pending_leg.candidate_index
                    && leg.codec == pending_leg.codec
            });
            let sink = match previous {
                Some(pos) => negotiation.previous_legs.swap_remove(pos).sink,
                None => {
                    let (sink, reader) = FrameQueue::bounded(
                        self.config.receive_buffer_frames,
                        self.config.target_latency,
                    );
                    self.streams_out.lock().push_back(MediaStream {
                        codec: pending_leg.codec,
                        kind: pending_leg.kind.clone(),
                        reader,
                    });
                    sink
                }
            };
            legs.push(StreamLeg {
                codec: pending_leg.codec,
                kind: pending_leg.kind,
                control: pending_leg.control,
                candidate_index: pending_leg.candidate_index,
                sink,
                time_base: TimeBase::new(pending_leg.clock_rate),
                packets_received: 0,
            });
        }
        // Surviving legs the new description no longer offers end here.
        for stale in negotiation.previous_legs.drain(..) {
            tracing::info!(control = %stale.control, "leg gone after reconnect");
            stale.sink.finish();
        }

        let leg_count = legs.len();
        if let Some(session) = self.session.as_mut() {
            session.legs = legs;
        }
        tracing::info!(legs = leg_count, reconnect = negotiation.reconnect, "negotiation complete");

        if negotiation.reconnect {
            // Straight to PLAY so the caller observes no gap.
            self.send_play(negotiation.ticket, true);
        } else {
            self.set_state(SessionState::ReadyToPlay);
            if let Some(ticket) = negotiation.ticket {
                ticket.resolve(CommandOutcome::Success);
            }
        }
    }

    /// End the current negotiation attempt with `outcome`.
    fn fail_negotiation(&mut self, outcome: CommandOutcome) {
        self.pending = None;
        self.watchdogs.cancel(WatchdogKind::DescribeTimeout);
        self.transport = None;

        let Some(negotiation) = self.negotiation.take() else {
            return;
        };
        tracing::warn!(?outcome, reconnect = negotiation.reconnect, "negotiation failed");

        // The ticket resolves last in both branches: the caller must never
        // wake while the state machine is still mid-transition.
        if negotiation.reconnect {
            // Surviving queues go back to the session for the next attempt.
            if let Some(session) = self.session.as_mut() {
                session.legs = negotiation.previous_legs;
            }
            self.retry_or_teardown();
            if let Some(ticket) = negotiation.ticket {
                ticket.resolve(CommandOutcome::ReconnectFailed);
            }
        } else {
            self.session = None;
            self.watchdogs.cancel_all();
            self.set_state(SessionState::Initial);
            self.arm_silent_retry();
            if let Some(ticket) = negotiation.ticket {
                ticket.resolve(outcome);
            }
        }
    }

    /// Fail-fast-then-retry-silently: after a failed initial Open the
    /// original caller has already been answered; under an active policy a
    /// delayed internal retry is armed that never reports to that caller.
    fn arm_silent_retry(&mut self) {
        if self.auto_reconnect_enabled() && self.retry_target.is_some() {
            tracing::info!(delay = ?self.config.auto_reconnect, "arming silent open retry");
            self.watchdogs
                .arm(WatchdogKind::AutoReconnect, self.config.auto_reconnect);
        }
    }

    /// After a failed reconnect attempt: retry later under the policy, or
    /// give consumers their end-of-stream.
    fn retry_or_teardown(&mut self) {
        if self.auto_reconnect_enabled() {
            self.set_state(SessionState::Reconnecting);
            self.watchdogs
                .arm(WatchdogKind::AutoReconnect, self.config.auto_reconnect);
        } else {
            self.teardown_session();
        }
    }

    // ---- play ------------------------------------------------------------

    fn send_play(&mut self, ticket: Option<CommandTicket>, reconnect: bool) {
        let (uri, session_id, offset, credentials) = match self.session.as_ref() {
            Some(session) => match session.session_id.clone() {
                Some(id) => (
                    session.base_uri.clone(),
                    id,
                    session.start_offset_secs,
                    session.credentials.clone(),
                ),
                None => {
                    self.play_failed(ticket, reconnect);
                    return;
                }
            },
            None => {
                self.play_failed(ticket, reconnect);
                return;
            }
        };

        let cseq = self.next_cseq();
        let request = RtspRequest::play(&uri, cseq, &session_id, offset)
            .with_credentials(credentials.as_ref());
        if let Err(error) = self.send(&request) {
            tracing::warn!(%error, "play send failed");
            self.play_failed(ticket, reconnect);
            return;
        }
        self.pending = Some((cseq, Pending::Play { ticket, reconnect }));
    }

    fn handle_play_response(
        &mut self,
        ticket: Option<CommandTicket>,
        reconnect: bool,
        response: RtspResponse,
    ) {
        if !response.is_ok() {
            tracing::warn!(status = response.status_code, "play rejected");
            self.play_failed(ticket, reconnect);
            return;
        }
        self.set_state(SessionState::Playing);
        if let Some(ticket) = ticket {
            ticket.resolve(CommandOutcome::Success);
        }
        self.arm_playing_watchdogs();
        tracing::info!(reconnect, "playing");
    }

    fn play_failed(&mut self, ticket: Option<CommandTicket>, reconnect: bool) {
        if reconnect {
            self.transport = None;
            self.retry_or_teardown();
            if let Some(ticket) = ticket {
                ticket.resolve(CommandOutcome::ReconnectFailed);
            }
        } else {
            if let Some(ticket) = ticket {
                ticket.resolve(CommandOutcome::PlayFailed);
            }
            // Play failure leaves the negotiated session in place.
        }
    }

    fn arm_playing_watchdogs(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.last_gap_sample = session.total_packets();
        let keepalive_secs = session.keepalive_secs;
        let remaining = session.remaining_secs();

        self.watchdogs
            .arm(WatchdogKind::GapCheck, self.config.gap_interval);
        if self.config.keep_alive {
            // Refresh at half the granted timeout so a slow round trip
            // cannot let the server-side session expire.
            let interval = Duration::from_secs((keepalive_secs / 2).max(1));
            self.watchdogs.arm(WatchdogKind::KeepAlive, interval);
        }
        if let Some(remaining) = remaining {
            self.watchdogs
                .arm(WatchdogKind::SessionEnd, Duration::from_secs_f64(remaining));
        }
    }

    // ---- reconnect -------------------------------------------------------

    /// Start a reconnect attempt. Position recovery runs only when leaving
    /// `Playing`; a retry from `Reconnecting` has already recovered.
    fn begin_reconnect(&mut self, ticket: Option<CommandTicket>) {
        let recovering = self.state == SessionState::Playing;
        let Some(session) = self.session.as_mut() else {
            if let Some(ticket) = ticket {
                ticket.resolve(CommandOutcome::WrongState);
            }
            return;
        };

        if recovering {
            // The most conservative consumer position across legs bounds
            // how far playback may be advanced without skipping content.
            let min_position_us = session
                .legs
                .iter()
                .map(|leg| leg.sink.current_play_position_us())
                .min()
                .unwrap_or(0);
            session.start_offset_secs += min_position_us as f64 / 1_000_000.0;
            for leg in &mut session.legs {
                leg.sink.reset_time_baseline();
                leg.time_base.reset();
            }
            tracing::info!(
                recovered_us = min_position_us,
                new_offset_secs = session.start_offset_secs,
                "reconnect position recovery"
            );
        }
        session.session_id = None;

        let target = session.target.clone();
        self.watchdogs.cancel_all();
        self.transport = None;
        self.pending = None;
        self.set_state(SessionState::Reconnecting);

        match self.connector.connect(&target) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.set_state(SessionState::Negotiating);
                let previous_legs = self
                    .session
                    .as_mut()
                    .map(|s| std::mem::take(&mut s.legs))
                    .unwrap_or_default();
                self.negotiation = Some(Negotiation {
                    reconnect: true,
                    ticket,
                    candidates: Vec::new(),
                    next_candidate: 0,
                    accepted: Vec::new(),
                    previous_legs,
                });
                self.send_describe();
            }
            Err(error) => {
                tracing::warn!(%error, "reconnect: connect failed");
                self.retry_or_teardown();
                if let Some(ticket) = ticket {
                    ticket.resolve(CommandOutcome::ReconnectFailed);
                }
            }
        }
    }

    // ---- watchdogs -------------------------------------------------------

    /// Fire every due watchdog. Called once per engine iteration.
    pub fn run_watchdogs(&mut self, now: Instant) {
        for kind in self.watchdogs.pop_due(now) {
            self.on_watchdog(kind);
        }
    }

    fn on_watchdog(&mut self, kind: WatchdogKind) {
        tracing::debug!(?kind, state = ?self.state, "watchdog fired");
        match kind {
            WatchdogKind::DescribeTimeout => {
                if matches!(self.pending, Some((_, Pending::Describe))) {
                    self.pending = None;
                    self.fail_negotiation(CommandOutcome::ServerNotReachable);
                }
            }
            WatchdogKind::GapCheck => self.on_gap_check(),
            WatchdogKind::KeepAlive => self.on_keepalive_due(),
            WatchdogKind::SessionEnd => {
                if self.state == SessionState::Playing {
                    tracing::info!("session duration elapsed");
                    self.send_teardown();
                    self.teardown_session();
                }
            }
            WatchdogKind::AutoReconnect => match self.state {
                SessionState::Initial => {
                    if let Some((target, credentials)) = self.retry_target.clone() {
                        tracing::info!("silent open retry");
                        self.begin_open(target, credentials, None);
                    }
                }
                SessionState::Reconnecting => self.begin_reconnect(None),
                _ => {}
            },
        }
    }

    /// Sample packet arrival; silence over one full interval means the
    /// session died without a transport-level error.
    fn on_gap_check(&mut self) {
        if self.state != SessionState::Playing {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let total = session.total_packets();
        if total != session.last_gap_sample {
            session.last_gap_sample = total;
            self.watchdogs
                .arm(WatchdogKind::GapCheck, self.config.gap_interval);
            return;
        }

        tracing::warn!(packets = total, "no packets since last check, session presumed dead");
        if self.auto_reconnect_enabled() {
            self.begin_reconnect(None);
        } else {
            self.send_teardown();
            self.teardown_session();
        }
    }

    fn on_keepalive_due(&mut self) {
        if self.state != SessionState::Playing {
            return;
        }
        if self.pending.is_some() {
            // Another round trip is in flight; it keeps the session warm.
            self.watchdogs
                .arm(WatchdogKind::KeepAlive, Duration::from_secs(1));
            return;
        }
        let (uri, session_id, credentials) = match self.session.as_ref() {
            Some(session) => match session.session_id.clone() {
                Some(id) => (
                    session.base_uri.clone(),
                    id,
                    session.credentials.clone(),
                ),
                None => return,
            },
            None => return,
        };
        let cseq = self.next_cseq();
        let request =
            RtspRequest::keep_alive(&uri, cseq, &session_id).with_credentials(credentials.as_ref());
        match self.send(&request) {
            Ok(()) => self.pending = Some((cseq, Pending::KeepAlive)),
            Err(error) => tracing::warn!(%error, "keep-alive send failed"),
        }
    }

    // ---- network ---------------------------------------------------------

    /// Drain ready transport events, bounded per tick.
    pub fn poll_network(&mut self) {
        for _ in 0..MAX_EVENTS_PER_TICK {
            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            match transport.poll_event() {
                Ok(Some(event)) => self.on_transport_event(event),
                Ok(None) => return,
                Err(error) => {
                    tracing::warn!(%error, "transport error");
                    self.on_transport_event(TransportEvent::Disconnected);
                    return;
                }
            }
        }
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Response(response) => self.on_response(response),
            TransportEvent::Packet { leg_index, data } => self.deliver_packet(leg_index, &data),
            TransportEvent::Disconnected => self.on_disconnected(),
        }
    }

    fn on_response(&mut self, response: RtspResponse) {
        let matches_pending = match (&self.pending, response.cseq()) {
            (Some((expected, _)), Some(cseq)) => *expected == cseq,
            _ => false,
        };
        if !matches_pending {
            tracing::trace!(cseq = ?response.cseq(), "stale response ignored");
            return;
        }
        let Some((_, pending)) = self.pending.take() else {
            return;
        };
        match pending {
            Pending::Describe => self.handle_describe_response(response),
            Pending::Setup { candidate } => self.handle_setup_response(candidate, response),
            Pending::Play { ticket, reconnect } => {
                self.handle_play_response(ticket, reconnect, response)
            }
            Pending::KeepAlive => {
                if response.is_ok() {
                    if self.state == SessionState::Playing && self.config.keep_alive {
                        let interval = self
                            .session
                            .as_ref()
                            .map(|s| (s.keepalive_secs / 2).max(1))
                            .unwrap_or(30);
                        self.watchdogs
                            .arm(WatchdogKind::KeepAlive, Duration::from_secs(interval));
                    }
                } else {
                    tracing::warn!(status = response.status_code, "keep-alive rejected");
                }
            }
        }
    }

    fn deliver_packet(&mut self, leg_index: usize, data: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(leg) = session.legs.get_mut(leg_index) else {
            tracing::trace!(leg_index, "packet for unknown leg");
            return;
        };
        let packet = match RtpPacket::parse(data) {
            Ok(packet) => packet,
            Err(error) => {
                tracing::warn!(%error, leg_index, "bad RTP packet");
                return;
            }
        };
        leg.packets_received += 1;
        let timestamp_us = leg.time_base.to_presentation_us(packet.timestamp);
        leg.sink.push(Frame::new(
            packet.payload.to_vec(),
            timestamp_us,
            packet.marker,
        ));
    }

    /// The far end closed the control connection.
    fn on_disconnected(&mut self) {
        match self.state {
            SessionState::Negotiating => {
                self.fail_negotiation(CommandOutcome::ServerNotReachable)
            }
            SessionState::ReadyToPlay | SessionState::Playing => {
                // Explicit remote teardown: a clean end-of-stream, never
                // retried.
                tracing::info!("remote end closed the session");
                if let Some((_, Pending::Play { ticket: Some(ticket), .. })) = self.pending.take() {
                    ticket.resolve(CommandOutcome::PlayFailed);
                }
                self.retry_target = None;
                self.teardown_session();
            }
            _ => {
                self.transport = None;
            }
        }
    }

    // ---- teardown --------------------------------------------------------

    /// Best-effort TEARDOWN request; failures are irrelevant because the
    /// session is being destroyed either way.
    fn send_teardown(&mut self) {
        let (uri, session_id, credentials) = match self.session.as_ref() {
            Some(session) => match session.session_id.clone() {
                Some(id) => (
                    session.base_uri.clone(),
                    id,
                    session.credentials.clone(),
                ),
                None => return,
            },
            None => return,
        };
        let cseq = self.next_cseq();
        let request =
            RtspRequest::teardown(&uri, cseq, &session_id).with_credentials(credentials.as_ref());
        if let Err(error) = self.send(&request) {
            tracing::debug!(%error, "teardown send failed (ignored)");
        }
    }

    /// Stop semantics: cancel every watchdog, release the legs with their
    /// sentinel frames, drop the transport, return to `Initial`.
    fn teardown_session(&mut self) {
        self.watchdogs.cancel_all();
        self.pending = None;
        if let Some(negotiation) = self.negotiation.take() {
            if let Some(ticket) = negotiation.ticket {
                ticket.resolve(CommandOutcome::Closed);
            }
            // Legs parked during a reconnect negotiation still owe their
            // readers an end-of-stream.
            for leg in negotiation.previous_legs {
                leg.sink.finish();
            }
        }
        if let Some(session) = self.session.take() {
            for leg in session.legs {
                leg.sink.finish();
            }
            tracing::info!("session torn down");
        }
        self.transport = None;
        self.set_state(SessionState::Initial);
    }

    // ---- engine support --------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn next_watchdog_deadline(&mut self) -> Option<Instant> {
        self.watchdogs.next_deadline()
    }
}
