//! A negotiation agent process: one party's conversation state, its oracle
//! calls, and its connection to the relay.

pub mod config;
pub mod research;
pub mod runtime;
