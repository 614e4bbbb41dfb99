//! Audit Logger - persists every agent action as a chained audit entry.
//!
//! Always on. The `audit_logger` setting only controls a warning, since an
//! interaction without its trail would be ungoverned.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{AgentAction, AuditEntry};
use crate::error::{GovernanceError, GovernanceResult};
use crate::storage::InteractionStore;

/// Attempts before a contended append gives up.
const MAX_APPEND_ATTEMPTS: usize = 5;

pub struct AuditLogger {
    store: Arc<dyn InteractionStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self { store }
    }

    /// Append `action` to the interaction's trail.
    ///
    /// Retries when another writer extended the trail first, so concurrent
    /// recorders never lose an entry.
    pub async fn record(
        &self,
        interaction_id: Uuid,
        action: AgentAction,
        enabled: bool,
    ) -> GovernanceResult<AuditEntry> {
        if !enabled {
            tracing::warn!(
                interaction_id = %interaction_id,
                agent = %action.agent_name,
                "Audit logger disabled in settings, recording anyway"
            );
        }

        let mut last_conflict = None;
        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let head = self.store.audit_head(interaction_id).await?;
            let entry = AuditEntry::next(interaction_id, head.as_ref(), action.clone())?;

            match self.store.append_audit_entry(&entry).await {
                Ok(()) => {
                    tracing::debug!(
                        interaction_id = %interaction_id,
                        sequence = entry.sequence,
                        agent = %entry.action.agent_name,
                        action = %entry.action.action,
                        "Audit entry recorded"
                    );
                    return Ok(entry);
                }
                Err(GovernanceError::Conflict(msg)) => {
                    tracing::debug!(interaction_id = %interaction_id, attempt, "Audit append contended, retrying");
                    last_conflict = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }

        Err(GovernanceError::Conflict(last_conflict.unwrap_or_else(|| {
            format!("Audit trail of interaction {} is contended", interaction_id)
        })))
    }

    /// Append several actions in order.
    pub async fn record_all(
        &self,
        interaction_id: Uuid,
        actions: impl IntoIterator<Item = AgentAction>,
        enabled: bool,
    ) -> GovernanceResult<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        for action in actions {
            entries.push(self.record(interaction_id, action, enabled).await?);
        }
        Ok(entries)
    }
}
