//! The session state machine the relay owns.
//!
//! Exactly one [`NegotiationSession`] exists per relay instance. It moves
//! through `WaitingForAgents -> Active -> Ending -> Ended`; a registration
//! arriving after `Ended` resets it for a fresh cycle. All mutation happens
//! under the relay's session lock, so per-session handling is serialized;
//! correct for a strict turn-taking protocol where exactly one party speaks
//! at a time.
//!
//! Two behaviors are deliberately stricter than a naive relay:
//! a second registration for an occupied role is rejected rather than
//! replacing the prior connection, and the relay tracks whose turn it is,
//! dropping out-of-turn messages instead of trusting agent cooperation.

use chrono::Utc;
use dealtalk_core::negotiation::{
    self, JUDGMENT_WINDOW_TURNS, Role, SessionMeta, Turn, TurnLimits,
};
use dealtalk_core::protocol::Envelope;
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

/// Lifecycle phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForAgents,
    Active,
    Ending,
    Ended,
}

/// A registered agent endpoint: its display name, the id of the connection
/// that claimed the slot, and the handle used to push envelopes to that
/// connection's writer task.
pub struct Party {
    pub name: String,
    conn_id: u32,
    outbox: mpsc::UnboundedSender<Envelope>,
}

impl Party {
    /// Best-effort delivery. A closed channel means the connection is gone;
    /// the disconnect path owns the consequences, so this only logs.
    pub fn send(&self, envelope: Envelope) {
        if self.outbox.send(envelope).is_err() {
            warn!(party = %self.name, "outbound channel closed; dropping envelope");
        }
    }
}

/// Result of a registration attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The slot was free; `session_ready` is true when this registration
    /// filled the second slot and the session just went active.
    Joined { session_ready: bool },
    /// The role already has a live connection; the newcomer is turned away.
    RoleTaken,
}

/// Why an inbound message-turn was dropped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TurnRejected {
    #[error("no active session")]
    NotActive,
    #[error("empty turn text")]
    EmptyText,
    #[error("out of turn: expected {expected} to speak")]
    OutOfTurn { expected: Role },
}

/// What the termination check should do after the latest turn.
#[derive(Debug)]
pub enum TerminationProbe {
    /// Hard ceiling reached; end unconditionally.
    Ceiling,
    /// Below the minimum-turn guard; no evaluation at all.
    BelowMinimum,
    /// Within bounds but on an odd turn; evaluation only runs every second
    /// turn to bound oracle call volume.
    OffCycle,
    /// Submit this window and metadata to the oracle for judgment.
    Evaluate { window: String, meta: SessionMeta },
}

pub struct NegotiationSession {
    phase: Phase,
    company: Option<Party>,
    investor: Option<Party>,
    history: Vec<Turn>,
    turn_count: u32,
    next_role: Role,
    limits: TurnLimits,
}

impl NegotiationSession {
    pub fn new(limits: TurnLimits) -> Self {
        Self {
            phase: Phase::WaitingForAgents,
            company: None,
            investor: None,
            history: Vec::new(),
            turn_count: 0,
            next_role: Role::Company,
            limits,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn limits(&self) -> TurnLimits {
        self.limits
    }

    pub fn party(&self, role: Role) -> Option<&Party> {
        match role {
            Role::Company => self.company.as_ref(),
            Role::Investor => self.investor.as_ref(),
        }
    }

    /// Whether the given connection currently occupies the role slot. False
    /// for stale connections whose slot was reclaimed in a later cycle; their
    /// frames and disconnects must not touch the current session.
    pub fn owns_slot(&self, role: Role, conn_id: u32) -> bool {
        self.party(role).is_some_and(|p| p.conn_id == conn_id)
    }

    /// Registers an agent for a role. After a finished session, the first
    /// new registration resets the state for a brand-new cycle.
    pub fn register(
        &mut self,
        role: Role,
        name: String,
        conn_id: u32,
        outbox: mpsc::UnboundedSender<Envelope>,
    ) -> RegisterOutcome {
        if self.phase == Phase::Ended {
            self.reset();
        }

        let slot = match role {
            Role::Company => &mut self.company,
            Role::Investor => &mut self.investor,
        };
        if slot.is_some() {
            return RegisterOutcome::RoleTaken;
        }
        *slot = Some(Party {
            name,
            conn_id,
            outbox,
        });

        let session_ready = self.phase == Phase::WaitingForAgents
            && self.company.is_some()
            && self.investor.is_some();
        if session_ready {
            self.phase = Phase::Active;
            self.next_role = Role::Company;
        }
        RegisterOutcome::Joined { session_ready }
    }

    /// The `session_start` broadcast. Only meaningful once both slots are
    /// filled; the company agent treats it as the directive to open.
    pub fn start_event(&self) -> Option<Envelope> {
        Some(Envelope::SessionStart {
            company: self.company.as_ref()?.name.clone(),
            investor: self.investor.as_ref()?.name.clone(),
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    /// Validates and appends one turn. On success the global count
    /// increments, history grows by exactly one, and the expected speaker
    /// flips to the counterparty.
    pub fn record_turn(
        &mut self,
        sender: &str,
        text: &str,
        role: Role,
        seq: u32,
    ) -> Result<(), TurnRejected> {
        if self.phase != Phase::Active {
            return Err(TurnRejected::NotActive);
        }
        if text.trim().is_empty() {
            return Err(TurnRejected::EmptyText);
        }
        if role != self.next_role {
            return Err(TurnRejected::OutOfTurn {
                expected: self.next_role,
            });
        }

        self.history.push(Turn {
            sender: sender.to_string(),
            role,
            text: text.to_string(),
            seq,
            timestamp: Utc::now(),
        });
        self.turn_count += 1;
        self.next_role = role.counterpart();
        Ok(())
    }

    /// Decides what the post-turn termination check should do.
    pub fn termination_probe(&self) -> TerminationProbe {
        if self.turn_count >= self.limits.max_turns {
            return TerminationProbe::Ceiling;
        }
        if self.turn_count < self.limits.min_turns {
            return TerminationProbe::BelowMinimum;
        }
        if self.turn_count % 2 != 0 {
            return TerminationProbe::OffCycle;
        }
        let start = self.history.len().saturating_sub(JUDGMENT_WINDOW_TURNS);
        TerminationProbe::Evaluate {
            window: negotiation::format_transcript(&self.history[start..]),
            meta: self.meta(),
        }
    }

    pub fn meta(&self) -> SessionMeta {
        SessionMeta {
            company: self.party_name(Role::Company),
            investor: self.party_name(Role::Investor),
            turn_count: self.turn_count,
            limits: self.limits,
        }
    }

    fn party_name(&self, role: Role) -> String {
        self.party(role)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| role.as_str().to_string())
    }

    /// Enters `Ending`. Returns false if the session is not active, which
    /// makes the whole conclusion path idempotent: only the first caller
    /// proceeds to broadcast.
    pub fn begin_ending(&mut self) -> bool {
        if self.phase == Phase::Active {
            self.phase = Phase::Ending;
            true
        } else {
            false
        }
    }

    /// Enters `Ended` after the `end` broadcast. No further turns accepted.
    pub fn finish(&mut self) {
        self.phase = Phase::Ended;
    }

    pub fn broadcast(&self, envelope: Envelope) {
        if let Some(company) = &self.company {
            company.send(envelope.clone());
        }
        if let Some(investor) = &self.investor {
            investor.send(envelope);
        }
    }

    /// Clears a role slot after its connection closed.
    pub fn clear_party(&mut self, role: Role) {
        match role {
            Role::Company => self.company = None,
            Role::Investor => self.investor = None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.limits);
    }
}

impl fmt::Debug for NegotiationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationSession")
            .field("phase", &self.phase)
            .field("turn_count", &self.turn_count)
            .field("next_role", &self.next_role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn session() -> NegotiationSession {
        NegotiationSession::new(TurnLimits::default())
    }

    fn join_with(
        session: &mut NegotiationSession,
        role: Role,
        name: &str,
        conn_id: u32,
    ) -> (RegisterOutcome, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (session.register(role, name.to_string(), conn_id, tx), rx)
    }

    fn join(
        session: &mut NegotiationSession,
        role: Role,
        name: &str,
    ) -> (RegisterOutcome, UnboundedReceiver<Envelope>) {
        let conn_id = match role {
            Role::Company => 1,
            Role::Investor => 2,
        };
        join_with(session, role, name, conn_id)
    }

    fn active_session() -> (NegotiationSession, UnboundedReceiver<Envelope>, UnboundedReceiver<Envelope>) {
        let mut s = session();
        let (_, company_rx) = join(&mut s, Role::Company, "Acme");
        let (outcome, investor_rx) = join(&mut s, Role::Investor, "Fund");
        assert_eq!(
            outcome,
            RegisterOutcome::Joined {
                session_ready: true
            }
        );
        (s, company_rx, investor_rx)
    }

    fn speak(s: &mut NegotiationSession, role: Role, seq: u32) {
        let sender = match role {
            Role::Company => "Acme",
            Role::Investor => "Fund",
        };
        s.record_turn(sender, "substantive terms", role, seq)
            .unwrap();
    }

    /// Drives an active session through `n` strictly alternating turns.
    fn exchange(s: &mut NegotiationSession, n: u32) {
        for i in 0..n {
            let role = if i % 2 == 0 {
                Role::Company
            } else {
                Role::Investor
            };
            speak(s, role, i / 2 + 1);
        }
    }

    #[test]
    fn session_goes_active_when_both_register() {
        let mut s = session();
        let (outcome, _rx) = join(&mut s, Role::Company, "Acme");
        assert_eq!(
            outcome,
            RegisterOutcome::Joined {
                session_ready: false
            }
        );
        assert_eq!(s.phase(), Phase::WaitingForAgents);

        let (outcome, _rx) = join(&mut s, Role::Investor, "Fund");
        assert_eq!(
            outcome,
            RegisterOutcome::Joined {
                session_ready: true
            }
        );
        assert_eq!(s.phase(), Phase::Active);
    }

    #[test]
    fn second_registration_for_occupied_role_is_rejected() {
        let (mut s, _c, _i) = active_session();
        let (outcome, _rx) = join(&mut s, Role::Company, "Impostor");
        assert_eq!(outcome, RegisterOutcome::RoleTaken);
        assert_eq!(s.party(Role::Company).unwrap().name, "Acme");
    }

    #[test]
    fn start_event_carries_both_names() {
        let (s, _c, _i) = active_session();
        match s.start_event() {
            Some(Envelope::SessionStart {
                company, investor, ..
            }) => {
                assert_eq!(company, "Acme");
                assert_eq!(investor, "Fund");
            }
            other => panic!("unexpected start event: {other:?}"),
        }
    }

    #[test]
    fn turn_count_tracks_history_exactly() {
        let (mut s, _c, _i) = active_session();
        exchange(&mut s, 5);
        assert_eq!(s.turn_count(), 5);
        assert_eq!(s.history().len(), 5);
        assert!(s.history().iter().all(|t| !t.text.is_empty()));
    }

    #[test]
    fn turns_must_alternate() {
        let (mut s, _c, _i) = active_session();
        speak(&mut s, Role::Company, 1);
        let err = s
            .record_turn("Acme", "speaking twice", Role::Company, 2)
            .unwrap_err();
        assert_eq!(
            err,
            TurnRejected::OutOfTurn {
                expected: Role::Investor
            }
        );
        assert_eq!(s.turn_count(), 1);
    }

    #[test]
    fn investor_cannot_open() {
        let (mut s, _c, _i) = active_session();
        let err = s
            .record_turn("Fund", "let me start", Role::Investor, 1)
            .unwrap_err();
        assert_eq!(
            err,
            TurnRejected::OutOfTurn {
                expected: Role::Company
            }
        );
    }

    #[test]
    fn empty_turns_are_rejected() {
        let (mut s, _c, _i) = active_session();
        assert_eq!(
            s.record_turn("Acme", "   ", Role::Company, 1),
            Err(TurnRejected::EmptyText)
        );
    }

    #[test]
    fn turns_before_session_start_are_rejected() {
        let mut s = session();
        let (_, _rx) = join(&mut s, Role::Company, "Acme");
        assert_eq!(
            s.record_turn("Acme", "hello?", Role::Company, 1),
            Err(TurnRejected::NotActive)
        );
    }

    #[test]
    fn probe_below_minimum_never_evaluates() {
        let (mut s, _c, _i) = active_session();
        exchange(&mut s, 2);
        // An explicit acceptance this early must not even reach the oracle.
        assert!(matches!(
            s.termination_probe(),
            TerminationProbe::BelowMinimum
        ));
    }

    #[test]
    fn probe_skips_odd_turns() {
        let (mut s, _c, _i) = active_session();
        exchange(&mut s, 7);
        assert!(matches!(s.termination_probe(), TerminationProbe::OffCycle));
    }

    #[test]
    fn probe_evaluates_on_even_turns_past_minimum() {
        let (mut s, _c, _i) = active_session();
        exchange(&mut s, 8);
        match s.termination_probe() {
            TerminationProbe::Evaluate { window, meta } => {
                assert_eq!(meta.turn_count, 8);
                assert_eq!(meta.company, "Acme");
                assert_eq!(meta.investor, "Fund");
                // Window is bounded to the most recent turns.
                assert_eq!(window.matches("]: ").count(), JUDGMENT_WINDOW_TURNS);
            }
            other => panic!("expected Evaluate, got {other:?}"),
        }
    }

    #[test]
    fn probe_hits_ceiling_at_max_turns() {
        let limits = TurnLimits {
            min_turns: 2,
            max_turns: 4,
        };
        let mut s = NegotiationSession::new(limits);
        let (_, _c) = join(&mut s, Role::Company, "Acme");
        let (_, _i) = join(&mut s, Role::Investor, "Fund");
        exchange(&mut s, 4);
        assert!(matches!(s.termination_probe(), TerminationProbe::Ceiling));
    }

    #[test]
    fn ending_is_idempotent() {
        let (mut s, _c, _i) = active_session();
        assert!(s.begin_ending());
        assert!(!s.begin_ending());
        s.finish();
        assert!(!s.begin_ending());
        assert_eq!(s.phase(), Phase::Ended);
    }

    #[test]
    fn no_turns_accepted_after_ended() {
        let (mut s, _c, _i) = active_session();
        exchange(&mut s, 3);
        s.begin_ending();
        s.finish();
        assert_eq!(
            s.record_turn("Acme", "one more thing", Role::Company, 3),
            Err(TurnRejected::NotActive)
        );
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn registration_after_ended_starts_fresh_cycle() {
        let (mut s, _c, _i) = active_session();
        exchange(&mut s, 3);
        s.begin_ending();
        s.finish();

        let (outcome, _rx) = join(&mut s, Role::Company, "NewCo");
        assert_eq!(
            outcome,
            RegisterOutcome::Joined {
                session_ready: false
            }
        );
        assert_eq!(s.phase(), Phase::WaitingForAgents);
        assert_eq!(s.turn_count(), 0);
        assert!(s.history().is_empty());
    }

    #[test]
    fn slot_ownership_follows_the_current_cycle() {
        let (mut s, _c, _i) = active_session();
        assert!(s.owns_slot(Role::Investor, 2));
        assert!(!s.owns_slot(Role::Investor, 7));

        exchange(&mut s, 3);
        s.begin_ending();
        s.finish();

        let (_, _rx) = join_with(&mut s, Role::Investor, "NewFund", 7);
        assert!(s.owns_slot(Role::Investor, 7));
        assert!(
            !s.owns_slot(Role::Investor, 2),
            "a connection from the previous cycle must not own the slot"
        );
        assert!(!s.owns_slot(Role::Company, 1));
    }

    #[test]
    fn broadcast_reaches_both_parties() {
        let (s, mut company_rx, mut investor_rx) = active_session();
        s.broadcast(Envelope::End {
            reason: "done".into(),
        });
        assert!(matches!(
            company_rx.try_recv(),
            Ok(Envelope::End { .. })
        ));
        assert!(matches!(
            investor_rx.try_recv(),
            Ok(Envelope::End { .. })
        ));
    }
}
