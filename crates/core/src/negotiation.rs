//! Negotiation Domain Types
//!
//! This module defines the core vocabulary of a negotiation session: the two
//! party roles, individual turns, turn limits, and the structured termination
//! decision the relay acts on. The relay owns the authoritative session state;
//! agents only ever hold their own local view built from these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence a termination judgment must exceed before the relay acts on it.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Number of recent turns included in the termination-judgment window.
pub const JUDGMENT_WINDOW_TURNS: usize = 6;

/// Number of recent transcript entries an agent feeds into its reply prompt.
pub const REPLY_CONTEXT_TURNS: usize = 8;

/// The two negotiating parties.
///
/// `Company` is the proposer (CEO role, speaks first); `Investor` is the
/// evaluator (counterparty that critiques, accepts, or declines terms).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Company,
    Investor,
}

impl Role {
    /// The party on the other side of the table.
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Company => Role::Investor,
            Role::Investor => Role::Company,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Company => "company",
            Role::Investor => "investor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete utterance, immutable once appended to history.
///
/// `seq` is the sender's own 1-based turn counter, not the relay's global
/// count; the two diverge because each party only increments its own.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Turn {
    pub sender: String,
    pub role: Role,
    pub text: String,
    pub seq: u32,
    pub timestamp: DateTime<Utc>,
}

/// Bounds on session length. `min_turns` must stay strictly below `max_turns`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnLimits {
    pub min_turns: u32,
    pub max_turns: u32,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            min_turns: 6,
            max_turns: 20,
        }
    }
}

/// How a negotiation session can conclude.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationStatus {
    Ongoing,
    DealAccepted,
    DealDeclined,
    Impasse,
    MaxTurnsReached,
    PartyDisconnected,
}

impl TerminationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationStatus::Ongoing => "ONGOING",
            TerminationStatus::DealAccepted => "DEAL_ACCEPTED",
            TerminationStatus::DealDeclined => "DEAL_DECLINED",
            TerminationStatus::Impasse => "IMPASSE",
            TerminationStatus::MaxTurnsReached => "MAX_TURNS_REACHED",
            TerminationStatus::PartyDisconnected => "PARTY_DISCONNECTED",
        }
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured verdict about whether the negotiation should end now.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationDecision {
    pub status: TerminationStatus,
    pub reason: String,
    pub confidence: f64,
}

impl TerminationDecision {
    /// The hard safety ceiling. Fires regardless of oracle availability.
    pub fn max_turns(limits: TurnLimits) -> Self {
        Self {
            status: TerminationStatus::MaxTurnsReached,
            reason: format!("turn ceiling of {} reached", limits.max_turns),
            confidence: 1.0,
        }
    }

    /// A mid-session disconnect ends the negotiation immediately.
    pub fn party_disconnected(name: &str) -> Self {
        Self {
            status: TerminationStatus::PartyDisconnected,
            reason: format!("{name} disconnected mid-session"),
            confidence: 1.0,
        }
    }

    /// Whether the relay should act on this decision: a non-ONGOING status
    /// with confidence above the fixed threshold.
    pub fn is_actionable(&self) -> bool {
        self.status != TerminationStatus::Ongoing && self.confidence > CONFIDENCE_THRESHOLD
    }
}

/// Session metadata handed to the oracle alongside a transcript window.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub company: String,
    pub investor: String,
    pub turn_count: u32,
    pub limits: TurnLimits,
}

/// Renders turns as a `[sender]: text` transcript, one blank line between
/// entries. Used for both judgment windows and the conclusion prompt.
pub fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("[{}]: {}", t.sender, t.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(sender: &str, text: &str) -> Turn {
        Turn {
            sender: sender.to_string(),
            role: Role::Company,
            text: text.to_string(),
            seq: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn counterpart_flips_roles() {
        assert_eq!(Role::Company.counterpart(), Role::Investor);
        assert_eq!(Role::Investor.counterpart(), Role::Company);
    }

    #[test]
    fn status_wire_format_is_screaming_snake() {
        let json = serde_json::to_string(&TerminationStatus::DealAccepted).unwrap();
        assert_eq!(json, "\"DEAL_ACCEPTED\"");
        let back: TerminationStatus = serde_json::from_str("\"MAX_TURNS_REACHED\"").unwrap();
        assert_eq!(back, TerminationStatus::MaxTurnsReached);
    }

    #[test]
    fn actionable_requires_status_and_confidence() {
        let low = TerminationDecision {
            status: TerminationStatus::DealAccepted,
            reason: "accepted".into(),
            confidence: 0.5,
        };
        assert!(!low.is_actionable());

        let high = TerminationDecision {
            confidence: 0.9,
            ..low.clone()
        };
        assert!(high.is_actionable());

        let ongoing = TerminationDecision {
            status: TerminationStatus::Ongoing,
            reason: "still talking".into(),
            confidence: 0.99,
        };
        assert!(!ongoing.is_actionable());
    }

    #[test]
    fn ceiling_decision_is_always_actionable() {
        let decision = TerminationDecision::max_turns(TurnLimits::default());
        assert!(decision.is_actionable());
        assert_eq!(decision.status, TerminationStatus::MaxTurnsReached);
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn transcript_formatting() {
        let turns = vec![turn("Acme", "We propose terms."), turn("Fund", "Go on.")];
        assert_eq!(
            format_transcript(&turns),
            "[Acme]: We propose terms.\n\n[Fund]: Go on."
        );
    }
}
