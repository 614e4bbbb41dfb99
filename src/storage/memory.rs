//! In-memory store, used when no database is configured.
//!
//! Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::InteractionStore;
use crate::domain::{
    AgentSettings, AuditEntry, GovernanceStats, Interaction, InteractionStatus, SeverityLevel,
    UserFeedback, Violation,
};
use crate::error::{GovernanceError, GovernanceResult};

struct Record {
    interaction: Interaction,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
struct State {
    records: HashMap<Uuid, Record>,
    /// Insertion order, oldest first.
    order: Vec<Uuid>,
    settings: Option<AgentSettings>,
}

impl State {
    fn record_mut(&mut self, id: Uuid) -> GovernanceResult<&mut Record> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| GovernanceError::NotFound(format!("Interaction {} not found", id)))
    }
}

/// Mock persistence backed by a single lock-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> GovernanceResult<()> {
        Ok(())
    }

    async fn create_interaction(&self, interaction: &Interaction) -> GovernanceResult<()> {
        let mut state = self.state.write().await;
        if state.records.contains_key(&interaction.id) {
            return Err(GovernanceError::Conflict(format!(
                "Interaction {} already exists",
                interaction.id
            )));
        }

        let mut stored = interaction.clone();
        stored.violations.clear();
        stored.agent_actions.clear();
        stored.feedback = None;

        state.order.push(stored.id);
        state.records.insert(
            stored.id,
            Record {
                interaction: stored,
                audit: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_violation(
        &self,
        interaction_id: Uuid,
        violation: &Violation,
    ) -> GovernanceResult<()> {
        let mut state = self.state.write().await;
        let record = state.record_mut(interaction_id)?;
        if record.interaction.violations.iter().any(|v| v.id == violation.id) {
            return Err(GovernanceError::Conflict(format!(
                "Violation {} already recorded",
                violation.id
            )));
        }
        record.interaction.violations.push(violation.clone());
        Ok(())
    }

    async fn audit_head(&self, interaction_id: Uuid) -> GovernanceResult<Option<AuditEntry>> {
        let state = self.state.read().await;
        let record = state
            .records
            .get(&interaction_id)
            .ok_or_else(|| GovernanceError::NotFound(format!("Interaction {} not found", interaction_id)))?;
        Ok(record.audit.last().cloned())
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> GovernanceResult<()> {
        let mut state = self.state.write().await;
        let record = state.record_mut(entry.interaction_id)?;

        let expected_sequence = record.audit.len() as i64;
        let links = match record.audit.last() {
            Some(head) => head.hash == entry.prev_hash,
            None => entry.prev_hash == crate::domain::GENESIS_HASH,
        };
        if entry.sequence != expected_sequence || !links {
            return Err(GovernanceError::Conflict(format!(
                "Audit entry {} does not extend the trail of interaction {}",
                entry.sequence, entry.interaction_id
            )));
        }

        record.interaction.agent_actions.push(entry.action.clone());
        record.audit.push(entry.clone());
        Ok(())
    }

    async fn update_decision(
        &self,
        interaction_id: Uuid,
        expected_version: i64,
        status: InteractionStatus,
        severity: SeverityLevel,
    ) -> GovernanceResult<i64> {
        let mut state = self.state.write().await;
        let interaction = &mut state.record_mut(interaction_id)?.interaction;
        if interaction.version != expected_version {
            return Err(GovernanceError::Conflict(format!(
                "Interaction {} is at version {}, expected {}",
                interaction_id, interaction.version, expected_version
            )));
        }

        interaction.status = status;
        interaction.severity = severity;
        interaction.version += 1;
        Ok(interaction.version)
    }

    async fn set_feedback(
        &self,
        interaction_id: Uuid,
        feedback: &UserFeedback,
    ) -> GovernanceResult<()> {
        let mut state = self.state.write().await;
        let interaction = &mut state.record_mut(interaction_id)?.interaction;
        if interaction.feedback.is_some() {
            return Err(GovernanceError::Conflict(format!(
                "Feedback for interaction {} was already submitted",
                interaction_id
            )));
        }
        interaction.feedback = Some(feedback.clone());
        Ok(())
    }

    async fn get_interaction(&self, interaction_id: Uuid) -> GovernanceResult<Interaction> {
        let state = self.state.read().await;
        state
            .records
            .get(&interaction_id)
            .map(|r| r.interaction.clone())
            .ok_or_else(|| GovernanceError::NotFound(format!("Interaction {} not found", interaction_id)))
    }

    async fn get_interactions(&self, limit: i64) -> GovernanceResult<Vec<Interaction>> {
        let state = self.state.read().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.records.get(id))
            .take(limit)
            .map(|r| r.interaction.clone())
            .collect())
    }

    async fn get_audit_trail(&self, interaction_id: Uuid) -> GovernanceResult<Vec<AuditEntry>> {
        let state = self.state.read().await;
        state
            .records
            .get(&interaction_id)
            .map(|r| r.audit.clone())
            .ok_or_else(|| GovernanceError::NotFound(format!("Interaction {} not found", interaction_id)))
    }

    async fn get_settings(&self) -> GovernanceResult<Option<AgentSettings>> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn save_settings(&self, settings: &AgentSettings) -> GovernanceResult<()> {
        self.state.write().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn stats(&self) -> GovernanceResult<GovernanceStats> {
        let state = self.state.read().await;
        Ok(GovernanceStats::from_interactions(
            state.records.values().map(|r| &r.interaction),
        ))
    }
}
