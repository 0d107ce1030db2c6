//! Defines the WebSocket message protocol between the agents and the relay.
//!
//! All traffic on the relay channel is one JSON object per text frame,
//! discriminated by a `type` tag. Frames that fail to decode are treated as
//! protocol errors by the receiver: logged and ignored, never fatal.

use crate::negotiation::{Role, TerminationStatus};
use serde::{Deserialize, Serialize};

/// The tagged-union message envelope exchanged over the relay channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Agent -> Relay. Claims a role slot; must be the first frame sent.
    Register { role: Role, name: String },
    /// Relay -> both. Both slots are filled and the session is live. For the
    /// company agent this doubles as the directive to produce turn 1.
    SessionStart {
        company: String,
        investor: String,
        timestamp: String,
    },
    /// Either direction. One negotiation turn; `turn` is the sender's own
    /// 1-based sequence number, not the relay's global count.
    Message {
        text: String,
        sender: String,
        role: Role,
        turn: u32,
    },
    /// Agent -> Relay. A turn-generation failure, reported instead of a turn.
    Error { error: String, sender: String },
    /// Relay -> both. The summarizing conclusion, sent before `end`.
    Conclusion {
        text: String,
        status: TerminationStatus,
        reason: String,
        total_turns: u32,
    },
    /// Relay -> both. The session is over; agents should disconnect.
    End { reason: String },
}
