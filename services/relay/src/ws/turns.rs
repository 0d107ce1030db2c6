//! Turn relaying, termination evaluation, and the session ending sequence.
//!
//! Everything here runs with the session lock held, so one inbound message
//! is processed to completion (forwarding, oracle judgment, and any ending
//! broadcast) before the next is handled.

use crate::session::{NegotiationSession, Phase, TerminationProbe};
use crate::state::AppState;
use dealtalk_core::negotiation::{self, Role, TerminationDecision};
use dealtalk_core::prompts;
use dealtalk_core::protocol::Envelope;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const CONCLUSION_SYSTEM: &str =
    "You are a seasoned financial analyst writing a post-negotiation review.";

/// Handles one inbound `message` envelope: verify the connection still owns
/// its role slot, validate and append the turn, forward it verbatim to the
/// counterparty, then run the termination check.
pub async fn handle_turn(state: &AppState, conn_id: u32, envelope: Envelope) {
    let Envelope::Message {
        text,
        sender,
        role,
        turn,
    } = &envelope
    else {
        return;
    };

    let mut session = state.session.lock().await;
    if !session.owns_slot(*role, conn_id) {
        warn!(sender = %sender, %role, conn_id, "turn from a connection that does not own the role slot; dropping");
        return;
    }
    if let Err(rejected) = session.record_turn(sender, text, *role, *turn) {
        warn!(sender = %sender, %rejected, "dropping message-turn");
        return;
    }
    info!(
        turn = session.turn_count(),
        max = session.limits().max_turns,
        sender = %sender,
        "relayed turn"
    );

    let counterpart = role.counterpart();
    match session.party(counterpart) {
        Some(party) => party.send(envelope.clone()),
        None => warn!(role = %counterpart, "no counterparty connected; turn not forwarded"),
    }

    check_termination(state, &mut session).await;
}

/// The post-turn termination check. Oracle unavailability, timeouts, and
/// malformed judgments all fail open: the negotiation continues.
async fn check_termination(state: &AppState, session: &mut NegotiationSession) {
    match session.termination_probe() {
        TerminationProbe::Ceiling => {
            let decision = TerminationDecision::max_turns(session.limits());
            info!(reason = %decision.reason, "turn ceiling reached");
            conclude(state, session, decision).await;
        }
        TerminationProbe::BelowMinimum | TerminationProbe::OffCycle => {}
        TerminationProbe::Evaluate { window, meta } => {
            debug!(turn = meta.turn_count, "submitting transcript window for judgment");
            let judgment = timeout(
                state.config.oracle_timeout,
                state.oracle.judge_termination(&window, &meta),
            )
            .await;
            match judgment {
                Ok(Ok(decision)) if decision.is_actionable() => {
                    info!(
                        status = %decision.status,
                        confidence = decision.confidence,
                        reason = %decision.reason,
                        "termination judgment acted upon"
                    );
                    conclude(state, session, decision).await;
                }
                Ok(Ok(decision)) => {
                    debug!(
                        status = %decision.status,
                        confidence = decision.confidence,
                        "judgment below action threshold; session continues"
                    );
                }
                Ok(Err(e)) => {
                    error!(error = %e, "termination judgment failed; session continues");
                }
                Err(_) => {
                    error!("termination judgment timed out; session continues");
                }
            }
        }
    }
}

/// Runs the ending sequence: conclusion summary, grace pause, `end`
/// broadcast. Idempotent; only the caller that flips the session into
/// `Ending` proceeds, so `end` goes out at most once per session.
pub async fn conclude(
    state: &AppState,
    session: &mut NegotiationSession,
    decision: TerminationDecision,
) {
    if !session.begin_ending() {
        return;
    }

    let meta = session.meta();
    let transcript = negotiation::format_transcript(session.history());
    let prompt = prompts::conclusion_prompt(&transcript, decision.status, meta.turn_count);
    let summary = match timeout(
        state.config.oracle_timeout,
        state.oracle.generate(CONCLUSION_SYSTEM, &prompt),
    )
    .await
    {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            error!(error = %e, "conclusion generation failed; using fallback summary");
            prompts::fallback_conclusion(&meta, decision.status)
        }
        Err(_) => {
            error!("conclusion generation timed out; using fallback summary");
            prompts::fallback_conclusion(&meta, decision.status)
        }
    };

    session.broadcast(Envelope::Conclusion {
        text: summary,
        status: decision.status,
        reason: decision.reason.clone(),
        total_turns: meta.turn_count,
    });

    // Give consumers time to render the conclusion before the end signal.
    tokio::time::sleep(state.config.conclusion_grace).await;

    session.broadcast(Envelope::End {
        reason: decision.reason,
    });
    session.finish();
    info!(
        status = %decision.status,
        total_turns = meta.turn_count,
        "session ended"
    );
}

/// Runs when a registered connection closes. A mid-session disconnect ends
/// the negotiation immediately with `PARTY_DISCONNECTED`; outside an active
/// session the slot is simply cleared. A connection whose slot was reclaimed
/// in a later cycle no longer owns it and must not touch the session.
pub async fn handle_disconnect(state: &AppState, conn_id: u32, role: Role, name: &str) {
    let mut session = state.session.lock().await;
    if !session.owns_slot(role, conn_id) {
        info!(party = %name, %role, conn_id, "stale connection closed; current session untouched");
        return;
    }
    if session.phase() == Phase::Active {
        warn!(party = %name, %role, "party disconnected mid-session; ending negotiation");
        conclude(state, &mut session, TerminationDecision::party_disconnected(name)).await;
    } else {
        info!(party = %name, %role, "party disconnected");
    }
    session.clear_party(role);
}
