//! Agent settings domain types.
//!
//! Controls which agents and detectors run and where the block threshold sits.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AgentName, ViolationType, MAX_SEVERITY};
use crate::error::{GovernanceError, GovernanceResult};

/// Per-detector enable flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DetectorToggles {
    pub pii: bool,
    pub bias: bool,
    pub hate_speech: bool,
    pub violence: bool,
    pub compliance: bool,
    pub misinformation: bool,
}

impl Default for DetectorToggles {
    fn default() -> Self {
        Self {
            pii: true,
            bias: true,
            hate_speech: true,
            violence: true,
            compliance: true,
            misinformation: true,
        }
    }
}

impl DetectorToggles {
    /// Whether the detector for `category` should run.
    ///
    /// Categories without a toggle are always enabled.
    pub fn is_enabled(&self, category: ViolationType) -> bool {
        match category {
            ViolationType::Pii => self.pii,
            ViolationType::Bias => self.bias,
            ViolationType::HateSpeech => self.hate_speech,
            ViolationType::Violence => self.violence,
            ViolationType::Compliance => self.compliance,
            ViolationType::Misinformation => self.misinformation,
            ViolationType::Hallucination | ViolationType::Gdpr => true,
        }
    }
}

/// Process-wide governance configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AgentSettings {
    pub policy_enforcer: bool,
    pub verifier: bool,
    /// Kept for compatibility. Audit logging always runs.
    pub audit_logger: bool,
    pub response_agent: bool,
    pub feedback_agent: bool,
    /// Decision severity at or above which an interaction is blocked (0-10).
    pub severity_threshold: f64,
    pub detectors: DetectorToggles,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            policy_enforcer: true,
            verifier: true,
            audit_logger: true,
            response_agent: true,
            feedback_agent: true,
            severity_threshold: 7.0,
            detectors: DetectorToggles::default(),
        }
    }
}

impl AgentSettings {
    /// Configured flag for an agent.
    pub fn is_agent_enabled(&self, agent: AgentName) -> bool {
        match agent {
            AgentName::PolicyEnforcer => self.policy_enforcer,
            AgentName::Verifier => self.verifier,
            AgentName::AuditLogger => self.audit_logger,
            AgentName::ResponseAgent => self.response_agent,
            AgentName::FeedbackAgent => self.feedback_agent,
        }
    }

    pub fn validate(&self) -> GovernanceResult<()> {
        if !self.severity_threshold.is_finite()
            || !(0.0..=MAX_SEVERITY).contains(&self.severity_threshold)
        {
            return Err(GovernanceError::BadRequest(format!(
                "severity_threshold must be within 0-10, got {}",
                self.severity_threshold
            )));
        }
        Ok(())
    }

    /// Produce the settings that result from applying `update`.
    pub fn apply(&self, update: &UpdateSettingsRequest) -> GovernanceResult<AgentSettings> {
        let mut next = self.clone();
        if let Some(v) = update.policy_enforcer {
            next.policy_enforcer = v;
        }
        if let Some(v) = update.verifier {
            next.verifier = v;
        }
        if let Some(v) = update.audit_logger {
            next.audit_logger = v;
        }
        if let Some(v) = update.response_agent {
            next.response_agent = v;
        }
        if let Some(v) = update.feedback_agent {
            next.feedback_agent = v;
        }
        if let Some(v) = update.severity_threshold {
            next.severity_threshold = v;
        }
        if let Some(detectors) = &update.detectors {
            next.detectors = detectors.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial settings update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_enforcer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_logger: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_agent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_agent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detectors: Option<DetectorToggles>,
}
