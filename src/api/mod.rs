//! HTTP API layer for the governance service.
//!
//! Provides REST endpoints for governing interactions, reviewing audit
//! trails, feedback and agent settings.

pub mod handlers;
mod routes;
mod types;

pub use routes::{build_router, ApiDoc};
pub use types::*;
