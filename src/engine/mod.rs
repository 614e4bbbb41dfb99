//! Governance engine.
//!
//! This module contains the agents of the governance pipeline:
//! - Detectors: Rule-based violation detection per category
//! - Policy Enforcer: Runs detectors and decides approve/block
//! - Verifier: Fact-checks borderline or factual-claim content
//! - Response Agent: Produces the text shown to the end user
//! - Feedback Agent: Reviews user feedback on decisions
//! - Audit Logger: Appends every agent action to a hash-chained trail
//! - Governance Orchestrator: Sequences all of the above

mod audit;
mod detectors;
mod enforcer;
mod feedback;
mod llm;
mod orchestrator;
mod responder;
mod settings;
mod verifier;

pub use audit::*;
pub use detectors::*;
pub use enforcer::*;
pub use feedback::*;
pub use llm::*;
pub use orchestrator::*;
pub use responder::*;
pub use settings::*;
pub use verifier::*;
