//! Governance Core - multi-agent AI governance pipeline.
//!
//! Every prompt/response pair passes through policy detectors, an enforcer,
//! an optional fact verifier and a response agent before it reaches a user.
//! Each agent decision is appended to a hash-chained audit trail.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod storage;

use crate::engine::GovernanceOrchestrator;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The governance pipeline.
    pub orchestrator: Arc<GovernanceOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<GovernanceOrchestrator>) -> Self {
        Self { orchestrator }
    }
}
