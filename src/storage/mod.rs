//! Storage layer for the governance service.
//!
//! Interactions are append-mostly: violations and audit entries are only
//! ever appended, and the decision fields are patched under an optimistic
//! version check.

mod memory;
mod models;
mod repository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AgentSettings, AuditEntry, GovernanceStats, Interaction, InteractionStatus, SeverityLevel,
    UserFeedback, Violation,
};
use crate::error::GovernanceResult;

pub use memory::MemoryStore;
pub use repository::GovernanceRepository;

/// Persistence collaborator for interactions, audit trails and settings.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Short backend label for health reporting.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> GovernanceResult<()>;

    /// Insert a new interaction. Its violations and actions are ignored;
    /// they are appended separately.
    async fn create_interaction(&self, interaction: &Interaction) -> GovernanceResult<()>;

    async fn append_violation(
        &self,
        interaction_id: Uuid,
        violation: &Violation,
    ) -> GovernanceResult<()>;

    /// Last entry of an interaction's audit trail.
    async fn audit_head(&self, interaction_id: Uuid) -> GovernanceResult<Option<AuditEntry>>;

    /// Append an entry. Fails with `Conflict` if its sequence is taken or
    /// it does not link to the current head.
    async fn append_audit_entry(&self, entry: &AuditEntry) -> GovernanceResult<()>;

    /// Patch status and severity if the stored version still equals
    /// `expected_version`. Returns the new version.
    async fn update_decision(
        &self,
        interaction_id: Uuid,
        expected_version: i64,
        status: InteractionStatus,
        severity: SeverityLevel,
    ) -> GovernanceResult<i64>;

    /// Attach feedback once. A second submission is a `Conflict`.
    async fn set_feedback(
        &self,
        interaction_id: Uuid,
        feedback: &UserFeedback,
    ) -> GovernanceResult<()>;

    /// Full interaction with violations and actions in insertion order.
    async fn get_interaction(&self, interaction_id: Uuid) -> GovernanceResult<Interaction>;

    /// Most recent first.
    async fn get_interactions(&self, limit: i64) -> GovernanceResult<Vec<Interaction>>;

    async fn get_audit_trail(&self, interaction_id: Uuid) -> GovernanceResult<Vec<AuditEntry>>;

    async fn get_settings(&self) -> GovernanceResult<Option<AgentSettings>>;

    async fn save_settings(&self, settings: &AgentSettings) -> GovernanceResult<()>;

    async fn stats(&self) -> GovernanceResult<GovernanceStats>;
}
