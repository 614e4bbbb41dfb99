//! Interaction domain types.
//!
//! An interaction is one governed prompt/response exchange and its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{AgentAction, SeverityLevel, Violation};

/// Disposition of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    /// Created, governance not finished.
    Pending,
    /// The original output may be shown.
    Approved,
    /// A safe refusal replaces the output.
    Blocked,
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionStatus::Pending => write!(f, "pending"),
            InteractionStatus::Approved => write!(f, "approved"),
            InteractionStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for InteractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InteractionStatus::Pending),
            "approved" => Ok(InteractionStatus::Approved),
            "blocked" => Ok(InteractionStatus::Blocked),
            _ => Err(format!("Invalid interaction status: {}", s)),
        }
    }
}

/// Where the governed output came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LlmProvenance {
    /// Provider label, e.g. "openrouter" or "fallback".
    pub source: String,
    pub model: String,
    /// Set when the provider failed and fallback text was governed instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Post-hoc human feedback on an interaction. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserFeedback {
    /// 1 (decision was wrong) to 5 (decision was right).
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

/// One governed exchange.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Interaction {
    pub id: Uuid,

    pub timestamp: DateTime<Utc>,

    /// The user's prompt.
    pub input: String,

    /// The model's raw output.
    pub output: String,

    pub status: InteractionStatus,

    /// Bucket of the highest violation severity, low when there are none.
    pub severity: SeverityLevel,

    /// Append-only.
    pub violations: Vec<Violation>,

    /// Append-only, in insertion order.
    pub agent_actions: Vec<AgentAction>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<UserFeedback>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmProvenance>,

    /// Optimistic-lock counter, bumped on every decision patch.
    pub version: i64,
}

impl Interaction {
    /// Create a pending interaction for the given exchange.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            input: input.into(),
            output: output.into(),
            status: InteractionStatus::Pending,
            severity: SeverityLevel::Low,
            violations: Vec::new(),
            agent_actions: Vec::new(),
            feedback: None,
            llm: None,
            version: 0,
        }
    }

    /// Attach LLM provenance.
    pub fn with_llm(mut self, llm: LlmProvenance) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Highest severity across all violations, regardless of confidence.
    pub fn max_violation_severity(&self) -> f64 {
        self.violations
            .iter()
            .map(|v| v.severity)
            .fold(0.0, f64::max)
    }

    pub fn is_blocked(&self) -> bool {
        self.status == InteractionStatus::Blocked
    }
}
