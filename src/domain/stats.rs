//! Aggregated statistics for the dashboard.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Interaction, InteractionStatus};

/// Governance overview across all stored interactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GovernanceStats {
    pub total_interactions: i64,
    pub approved: i64,
    pub blocked: i64,
    pub pending: i64,
    /// Percentage of decided interactions that were blocked.
    pub block_rate: f64,
    pub total_violations: i64,
    /// Violation counts keyed by violation type.
    pub violations_by_type: BTreeMap<String, i64>,
    /// Interaction counts keyed by severity level.
    pub interactions_by_severity: BTreeMap<String, i64>,
    /// Mean severity over all violations, 0 when there are none.
    pub average_violation_severity: f64,
    /// Agent action counts keyed by agent name.
    pub actions_by_agent: BTreeMap<String, i64>,
    pub feedback_count: i64,
}

impl GovernanceStats {
    /// Fold interactions into an overview.
    pub fn from_interactions<'a>(interactions: impl IntoIterator<Item = &'a Interaction>) -> Self {
        let mut stats = GovernanceStats::default();
        let mut severity_sum = 0.0;

        for interaction in interactions {
            stats.total_interactions += 1;
            match interaction.status {
                InteractionStatus::Approved => stats.approved += 1,
                InteractionStatus::Blocked => stats.blocked += 1,
                InteractionStatus::Pending => stats.pending += 1,
            }
            *stats
                .interactions_by_severity
                .entry(interaction.severity.to_string())
                .or_default() += 1;

            for violation in &interaction.violations {
                stats.total_violations += 1;
                severity_sum += violation.severity;
                *stats
                    .violations_by_type
                    .entry(violation.violation_type.to_string())
                    .or_default() += 1;
            }

            for action in &interaction.agent_actions {
                *stats
                    .actions_by_agent
                    .entry(action.agent_name.to_string())
                    .or_default() += 1;
            }

            if interaction.feedback.is_some() {
                stats.feedback_count += 1;
            }
        }

        stats.finish(severity_sum);
        stats
    }

    /// Derive the ratio fields once the counters are filled in.
    pub fn finish(&mut self, violation_severity_sum: f64) {
        let decided = self.approved + self.blocked;
        self.block_rate = if decided > 0 {
            (self.blocked as f64 / decided as f64) * 100.0
        } else {
            0.0
        };
        self.average_violation_severity = if self.total_violations > 0 {
            violation_severity_sum / self.total_violations as f64
        } else {
            0.0
        };
    }
}
