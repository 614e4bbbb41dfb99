//! Agent action domain types.
//!
//! An agent action is one audit record of what a governance agent did
//! to an interaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{SeverityLevel, Violation};

/// Identity of a governance agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum AgentName {
    PolicyEnforcer,
    Verifier,
    AuditLogger,
    ResponseAgent,
    FeedbackAgent,
}

impl AgentName {
    pub const ALL: [AgentName; 5] = [
        AgentName::PolicyEnforcer,
        AgentName::Verifier,
        AgentName::AuditLogger,
        AgentName::ResponseAgent,
        AgentName::FeedbackAgent,
    ];
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentName::PolicyEnforcer => write!(f, "PolicyEnforcer"),
            AgentName::Verifier => write!(f, "Verifier"),
            AgentName::AuditLogger => write!(f, "AuditLogger"),
            AgentName::ResponseAgent => write!(f, "ResponseAgent"),
            AgentName::FeedbackAgent => write!(f, "FeedbackAgent"),
        }
    }
}

impl std::str::FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentName::ALL
            .into_iter()
            .find(|a| a.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown agent: {}", s))
    }
}

/// What an agent did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Approve,
    Block,
    Flag,
    Suggest,
    Log,
    Verify,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Approve => write!(f, "approve"),
            ActionKind::Block => write!(f, "block"),
            ActionKind::Flag => write!(f, "flag"),
            ActionKind::Suggest => write!(f, "suggest"),
            ActionKind::Log => write!(f, "log"),
            ActionKind::Verify => write!(f, "verify"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(ActionKind::Approve),
            "block" => Ok(ActionKind::Block),
            "flag" => Ok(ActionKind::Flag),
            "suggest" => Ok(ActionKind::Suggest),
            "log" => Ok(ActionKind::Log),
            "verify" => Ok(ActionKind::Verify),
            _ => Err(format!("Unknown action kind: {}", s)),
        }
    }
}

/// One immutable audit record of an agent decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AgentAction {
    pub id: Uuid,

    pub agent_name: AgentName,

    pub action: ActionKind,

    /// Free-text detail. Never shown to end users.
    pub details: String,

    pub timestamp: DateTime<Utc>,

    /// Echoed from the triggering violation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_level: Option<SeverityLevel>,

    /// Violations that triggered this action. Empty for approvals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violation_ids: Vec<Uuid>,
}

impl AgentAction {
    /// Create a new action with no triggering violation.
    pub fn new(agent_name: AgentName, action: ActionKind, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name,
            action,
            details: details.into(),
            timestamp: Utc::now(),
            severity: None,
            confidence: None,
            compliance_level: None,
            violation_ids: Vec::new(),
        }
    }

    /// Reference the given violations; scores are echoed from the most severe.
    pub fn triggered_by<'a>(mut self, violations: impl IntoIterator<Item = &'a Violation>) -> Self {
        let mut strongest: Option<&Violation> = None;
        for violation in violations {
            self.violation_ids.push(violation.id);
            if strongest.map_or(true, |s| violation.severity > s.severity) {
                strongest = Some(violation);
            }
        }

        if let Some(v) = strongest {
            self.severity = Some(v.severity);
            self.confidence = Some(v.confidence);
            self.compliance_level = Some(v.compliance_level);
        }
        self
    }

    /// Re-point violation references after the violations were re-keyed.
    pub fn remap_violations(&mut self, mapping: &[(Uuid, Uuid)]) {
        for id in &mut self.violation_ids {
            if let Some((_, scoped)) = mapping.iter().find(|(original, _)| original == id) {
                *id = *scoped;
            }
        }
    }
}
