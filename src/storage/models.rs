//! Database models for the governance store.
//!
//! These are the row types returned by SQLx queries.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{AuditEntry, Interaction, Violation};
use crate::error::{GovernanceError, GovernanceResult};

fn parse_uuid(value: &str) -> GovernanceResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| GovernanceError::Internal(e.to_string()))
}

fn parse_timestamp(value: &str) -> GovernanceResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| GovernanceError::Internal(e.to_string()))?
        .with_timezone(&Utc))
}

/// Database row for the interactions table.
#[derive(Debug, Clone, FromRow)]
pub struct InteractionRow {
    pub id: String,
    pub created_at: String,
    pub input: String,
    pub output: String,
    pub status: String,
    pub severity: String,
    pub llm: Option<String>,
    pub feedback: Option<String>,
    pub version: i64,
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = GovernanceError;

    /// Violations and actions are loaded separately.
    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        Ok(Interaction {
            id: parse_uuid(&row.id)?,
            timestamp: parse_timestamp(&row.created_at)?,
            input: row.input,
            output: row.output,
            status: row.status.parse().map_err(GovernanceError::Internal)?,
            severity: row.severity.parse().map_err(GovernanceError::Internal)?,
            violations: Vec::new(),
            agent_actions: Vec::new(),
            feedback: row.feedback.map(|f| serde_json::from_str(&f)).transpose()?,
            llm: row.llm.map(|l| serde_json::from_str(&l)).transpose()?,
            version: row.version,
        })
    }
}

/// Database row for the violations table.
#[derive(Debug, Clone, FromRow)]
pub struct ViolationRow {
    pub data: String,
}

impl TryFrom<ViolationRow> for Violation {
    type Error = GovernanceError;

    fn try_from(row: ViolationRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_str(&row.data)?)
    }
}

/// Database row for the audit_entries table.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEntryRow {
    pub interaction_id: String,
    pub sequence: i64,
    pub action_json: String,
    pub prev_hash: String,
    pub hash: String,
}

impl TryFrom<AuditEntryRow> for AuditEntry {
    type Error = GovernanceError;

    fn try_from(row: AuditEntryRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            interaction_id: parse_uuid(&row.interaction_id)?,
            sequence: row.sequence,
            action: serde_json::from_str(&row.action_json)?,
            prev_hash: row.prev_hash,
            hash: row.hash,
        })
    }
}
