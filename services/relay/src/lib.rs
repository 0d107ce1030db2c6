//! The negotiation relay: the coordination core that mediates all traffic
//! between the company and investor agents and owns session state,
//! termination evaluation, and graceful shutdown.

pub mod config;
pub mod session;
pub mod state;
pub mod ws;
