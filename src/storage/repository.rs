//! Repository layer for database operations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use super::InteractionStore;
use crate::domain::{
    AgentSettings, AuditEntry, GovernanceStats, Interaction, InteractionStatus, SeverityLevel,
    UserFeedback, Violation, GENESIS_HASH,
};
use crate::error::{GovernanceError, GovernanceResult};
use crate::storage::models::{AuditEntryRow, InteractionRow, ViolationRow};

/// Map a unique-constraint failure to `Conflict`.
fn conflict_on_unique(error: sqlx::Error, message: impl FnOnce() -> String) -> GovernanceError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            GovernanceError::Conflict(message())
        }
        _ => GovernanceError::Database(error),
    }
}

/// SQLite-backed interaction store.
#[derive(Clone)]
pub struct GovernanceRepository {
    pool: SqlitePool,
}

impl GovernanceRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema.
    pub async fn init_schema(&self) -> GovernanceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                input TEXT NOT NULL,
                output TEXT NOT NULL,
                status TEXT NOT NULL,
                severity TEXT NOT NULL,
                llm TEXT,
                feedback TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_interactions_created_at ON interactions(created_at);
            CREATE INDEX IF NOT EXISTS idx_interactions_status ON interactions(status);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS violations (
                id TEXT NOT NULL,
                interaction_id TEXT NOT NULL,
                violation_type TEXT NOT NULL,
                severity REAL NOT NULL,
                confidence REAL NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (interaction_id, id),
                FOREIGN KEY (interaction_id) REFERENCES interactions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_violations_type ON violations(violation_type);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                interaction_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                agent_name TEXT NOT NULL,
                action TEXT NOT NULL,
                action_json TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (interaction_id, sequence),
                FOREIGN KEY (interaction_id) REFERENCES interactions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_audit_entries_agent ON audit_entries(agent_name);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn interaction_exists(&self, id: Uuid) -> GovernanceResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM interactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    fn not_found(id: Uuid) -> GovernanceError {
        GovernanceError::NotFound(format!("Interaction {} not found", id))
    }

    /// Attach violations and actions to a bare interaction row.
    async fn hydrate(&self, row: InteractionRow) -> GovernanceResult<Interaction> {
        let mut interaction: Interaction = row.try_into()?;
        let id = interaction.id.to_string();

        let violations: Vec<ViolationRow> =
            sqlx::query_as("SELECT data FROM violations WHERE interaction_id = ? ORDER BY rowid ASC")
                .bind(&id)
                .fetch_all(&self.pool)
                .await?;
        interaction.violations = violations
            .into_iter()
            .map(Violation::try_from)
            .collect::<GovernanceResult<_>>()?;

        interaction.agent_actions = self
            .get_audit_trail(interaction.id)
            .await?
            .into_iter()
            .map(|entry| entry.action)
            .collect();

        Ok(interaction)
    }
}

#[async_trait]
impl InteractionStore for GovernanceRepository {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> GovernanceResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_interaction(&self, interaction: &Interaction) -> GovernanceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interactions (
                id, created_at, input, output, status, severity, llm, feedback, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(interaction.id.to_string())
        .bind(interaction.timestamp.to_rfc3339())
        .bind(&interaction.input)
        .bind(&interaction.output)
        .bind(interaction.status.to_string())
        .bind(interaction.severity.to_string())
        .bind(interaction.llm.as_ref().map(serde_json::to_string).transpose()?)
        .bind(interaction.version)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("Interaction {} already exists", interaction.id)))?;

        Ok(())
    }

    async fn append_violation(
        &self,
        interaction_id: Uuid,
        violation: &Violation,
    ) -> GovernanceResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO violations (id, interaction_id, violation_type, severity, confidence, data)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM interactions WHERE id = ?)
            "#,
        )
        .bind(violation.id.to_string())
        .bind(interaction_id.to_string())
        .bind(violation.violation_type.to_string())
        .bind(violation.severity)
        .bind(violation.confidence)
        .bind(serde_json::to_string(violation)?)
        .bind(interaction_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("Violation {} already recorded", violation.id)))?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(interaction_id));
        }
        Ok(())
    }

    async fn audit_head(&self, interaction_id: Uuid) -> GovernanceResult<Option<AuditEntry>> {
        if !self.interaction_exists(interaction_id).await? {
            return Err(Self::not_found(interaction_id));
        }

        let row: Option<AuditEntryRow> = sqlx::query_as(
            r#"
            SELECT interaction_id, sequence, action_json, prev_hash, hash
            FROM audit_entries
            WHERE interaction_id = ?
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(interaction_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AuditEntry::try_from).transpose()
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> GovernanceResult<()> {
        let id = entry.interaction_id.to_string();

        // Insert only if the entry links to the current head.
        let result = sqlx::query(
            r#"
            INSERT INTO audit_entries (
                interaction_id, sequence, agent_name, action, action_json, prev_hash, hash, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM interactions WHERE id = ?)
              AND (
                (? = 0 AND ? = ?)
                OR EXISTS (
                    SELECT 1 FROM audit_entries
                    WHERE interaction_id = ? AND sequence = ? - 1 AND hash = ?
                )
              )
            "#,
        )
        .bind(&id)
        .bind(entry.sequence)
        .bind(entry.action.agent_name.to_string())
        .bind(entry.action.action.to_string())
        .bind(serde_json::to_string(&entry.action)?)
        .bind(&entry.prev_hash)
        .bind(&entry.hash)
        .bind(entry.action.timestamp.to_rfc3339())
        .bind(&id)
        .bind(entry.sequence)
        .bind(&entry.prev_hash)
        .bind(GENESIS_HASH)
        .bind(&id)
        .bind(entry.sequence)
        .bind(&entry.prev_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("Audit sequence {} of interaction {} is taken", entry.sequence, id)
            })
        })?;

        if result.rows_affected() == 0 {
            if !self.interaction_exists(entry.interaction_id).await? {
                return Err(Self::not_found(entry.interaction_id));
            }
            return Err(GovernanceError::Conflict(format!(
                "Audit entry {} does not extend the trail of interaction {}",
                entry.sequence, id
            )));
        }
        Ok(())
    }

    async fn update_decision(
        &self,
        interaction_id: Uuid,
        expected_version: i64,
        status: InteractionStatus,
        severity: SeverityLevel,
    ) -> GovernanceResult<i64> {
        let result = sqlx::query(
            r#"
            UPDATE interactions
            SET status = ?, severity = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(status.to_string())
        .bind(severity.to_string())
        .bind(interaction_id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if !self.interaction_exists(interaction_id).await? {
                return Err(Self::not_found(interaction_id));
            }
            return Err(GovernanceError::Conflict(format!(
                "Interaction {} changed since version {}",
                interaction_id, expected_version
            )));
        }
        Ok(expected_version + 1)
    }

    async fn set_feedback(
        &self,
        interaction_id: Uuid,
        feedback: &UserFeedback,
    ) -> GovernanceResult<()> {
        let result =
            sqlx::query("UPDATE interactions SET feedback = ? WHERE id = ? AND feedback IS NULL")
                .bind(serde_json::to_string(feedback)?)
                .bind(interaction_id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            if !self.interaction_exists(interaction_id).await? {
                return Err(Self::not_found(interaction_id));
            }
            return Err(GovernanceError::Conflict(format!(
                "Feedback for interaction {} was already submitted",
                interaction_id
            )));
        }
        Ok(())
    }

    async fn get_interaction(&self, interaction_id: Uuid) -> GovernanceResult<Interaction> {
        let row: InteractionRow = sqlx::query_as("SELECT * FROM interactions WHERE id = ?")
            .bind(interaction_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Self::not_found(interaction_id))?;

        self.hydrate(row).await
    }

    async fn get_interactions(&self, limit: i64) -> GovernanceResult<Vec<Interaction>> {
        let rows: Vec<InteractionRow> = sqlx::query_as(
            "SELECT * FROM interactions ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        let mut interactions = Vec::with_capacity(rows.len());
        for row in rows {
            interactions.push(self.hydrate(row).await?);
        }
        Ok(interactions)
    }

    async fn get_audit_trail(&self, interaction_id: Uuid) -> GovernanceResult<Vec<AuditEntry>> {
        let rows: Vec<AuditEntryRow> = sqlx::query_as(
            r#"
            SELECT interaction_id, sequence, action_json, prev_hash, hash
            FROM audit_entries
            WHERE interaction_id = ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(interaction_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() && !self.interaction_exists(interaction_id).await? {
            return Err(Self::not_found(interaction_id));
        }

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_settings(&self) -> GovernanceResult<Option<AgentSettings>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM agent_settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(data,)| serde_json::from_str(&data)).transpose()?)
    }

    async fn save_settings(&self, settings: &AgentSettings) -> GovernanceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_settings (id, data, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(serde_json::to_string(settings)?)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stats(&self) -> GovernanceResult<GovernanceStats> {
        let (total, approved, blocked, pending, feedback_count): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) as total,
                    COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0) as approved,
                    COALESCE(SUM(CASE WHEN status = 'blocked' THEN 1 ELSE 0 END), 0) as blocked,
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) as pending,
                    COALESCE(SUM(CASE WHEN feedback IS NOT NULL THEN 1 ELSE 0 END), 0) as feedback_count
                FROM interactions
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        let (total_violations, severity_sum): (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(severity), 0.0) FROM violations",
        )
        .fetch_one(&self.pool)
        .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT violation_type, COUNT(*) as count FROM violations GROUP BY violation_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_severity: Vec<(String, i64)> = sqlx::query_as(
            "SELECT severity, COUNT(*) as count FROM interactions GROUP BY severity",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_agent: Vec<(String, i64)> = sqlx::query_as(
            "SELECT agent_name, COUNT(*) as count FROM audit_entries GROUP BY agent_name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = GovernanceStats {
            total_interactions: total,
            approved,
            blocked,
            pending,
            total_violations,
            violations_by_type: by_type.into_iter().collect::<BTreeMap<_, _>>(),
            interactions_by_severity: by_severity.into_iter().collect(),
            actions_by_agent: by_agent.into_iter().collect(),
            feedback_count,
            ..Default::default()
        };
        stats.finish(severity_sum);
        Ok(stats)
    }
}
