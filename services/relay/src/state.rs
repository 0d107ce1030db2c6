//! Shared Application State
//!
//! One `AppState` is created at startup and handed to every connection
//! handler. The oracle client is injected here rather than constructed where
//! it is used, so tests can substitute deterministic fakes.

use crate::config::RelayConfig;
use crate::session::NegotiationSession;
use dealtalk_core::oracle::OracleClient;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub oracle: Arc<dyn OracleClient>,
    /// The single session this relay instance coordinates. Handlers hold the
    /// lock for the whole of a message's processing (termination check
    /// included), which serializes relay-side handling per session.
    pub session: Mutex<NegotiationSession>,
}

impl AppState {
    pub fn new(config: RelayConfig, oracle: Arc<dyn OracleClient>) -> Self {
        let session = Mutex::new(NegotiationSession::new(config.limits));
        Self {
            config: Arc::new(config),
            oracle,
            session,
        }
    }
}
