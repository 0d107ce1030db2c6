//! Shared contract between the negotiation relay and the agent processes.
//!
//! Everything both sides must agree on lives here: the wire protocol
//! envelope, the negotiation domain types (roles, turns, termination
//! decisions), the oracle client used for utterance generation and
//! termination judgment, prompt construction, and output sanitization.

pub mod negotiation;
pub mod oracle;
pub mod prompts;
pub mod protocol;
pub mod sanitize;
