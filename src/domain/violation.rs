//! Violation domain types.
//!
//! A violation is one detected policy issue attached to an interaction.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{GovernanceError, GovernanceResult};

/// Namespace for content-derived violation ids.
const VIOLATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a94_0d3e_4b7a_9c51_8e2f_47a0_b3d6);

/// Upper bound of the severity scale.
pub const MAX_SEVERITY: f64 = 10.0;

/// Policy categories a violation can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// Personally identifying information.
    Pii,
    /// Categorical generalizations about protected groups.
    Bias,
    /// Slurs and dehumanizing language.
    HateSpeech,
    /// Requests for instructions to harm or kill.
    Violence,
    /// Claims that need fact-checking.
    Misinformation,
    /// Requests for clearly illegal activity.
    Compliance,
    /// Model output contradicting verified facts.
    Hallucination,
    /// Data-protection specific issues.
    Gdpr,
}

impl ViolationType {
    pub const ALL: [ViolationType; 8] = [
        ViolationType::Pii,
        ViolationType::Bias,
        ViolationType::HateSpeech,
        ViolationType::Violence,
        ViolationType::Misinformation,
        ViolationType::Compliance,
        ViolationType::Hallucination,
        ViolationType::Gdpr,
    ];

    /// Generic, user-safe label used in refusal messages.
    pub fn label(&self) -> &'static str {
        match self {
            ViolationType::Pii => "personal information",
            ViolationType::Bias => "biased generalizations",
            ViolationType::HateSpeech => "hateful language",
            ViolationType::Violence => "violence",
            ViolationType::Misinformation => "unverified claims",
            ViolationType::Compliance => "illegal activity",
            ViolationType::Hallucination => "unsupported statements",
            ViolationType::Gdpr => "data protection",
        }
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationType::Pii => write!(f, "pii"),
            ViolationType::Bias => write!(f, "bias"),
            ViolationType::HateSpeech => write!(f, "hate_speech"),
            ViolationType::Violence => write!(f, "violence"),
            ViolationType::Misinformation => write!(f, "misinformation"),
            ViolationType::Compliance => write!(f, "compliance"),
            ViolationType::Hallucination => write!(f, "hallucination"),
            ViolationType::Gdpr => write!(f, "gdpr"),
        }
    }
}

impl std::str::FromStr for ViolationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViolationType::ALL
            .into_iter()
            .find(|t| t.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown violation type: {}", s))
    }
}

/// Four-step severity scale shared by interactions and compliance levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    /// Bucket a continuous 0-10 score.
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            SeverityLevel::Critical
        } else if score >= 7.0 {
            SeverityLevel::High
        } else if score >= 4.0 {
            SeverityLevel::Medium
        } else {
            SeverityLevel::Low
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityLevel::Low => write!(f, "low"),
            SeverityLevel::Medium => write!(f, "medium"),
            SeverityLevel::High => write!(f, "high"),
            SeverityLevel::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(SeverityLevel::Low),
            "medium" => Ok(SeverityLevel::Medium),
            "high" => Ok(SeverityLevel::High),
            "critical" => Ok(SeverityLevel::Critical),
            _ => Err(format!("Unknown severity level: {}", s)),
        }
    }
}

/// Which text of the interaction a violation was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Input,
    Output,
}

impl std::fmt::Display for TextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextSource::Input => write!(f, "input"),
            TextSource::Output => write!(f, "output"),
        }
    }
}

impl std::str::FromStr for TextSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "input" => Ok(TextSource::Input),
            "output" => Ok(TextSource::Output),
            _ => Err(format!("Unknown text source: {}", s)),
        }
    }
}

/// One detected policy issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Violation {
    /// Unique within its interaction.
    pub id: Uuid,

    /// Policy category.
    #[serde(rename = "type")]
    pub violation_type: ViolationType,

    /// Human-readable description.
    pub description: String,

    /// Harm score on a 0.0-10.0 scale.
    pub severity: f64,

    /// Detector certainty on a 0.0-1.0 scale.
    pub confidence: f64,

    /// Free-text justification.
    pub reason: String,

    /// Applicable regulations, may list several.
    pub regulatory_framework: String,

    pub compliance_level: SeverityLevel,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation_steps: Vec<String>,

    /// Identifier of the rule that produced this violation.
    pub rule_id: String,

    /// Text the rule matched in.
    pub source: TextSource,
}

impl Violation {
    /// Deterministic id for a rule match: identical input yields identical ids.
    pub fn content_id(rule_id: &str, source: TextSource, start: usize, end: usize) -> Uuid {
        let key = format!("{}|{}|{}|{}", rule_id, source, start, end);
        Uuid::new_v5(&VIOLATION_NAMESPACE, key.as_bytes())
    }

    /// Re-key this violation under its owning interaction.
    pub fn scoped_to(mut self, interaction_id: Uuid) -> Self {
        self.id = Uuid::new_v5(&interaction_id, self.id.as_bytes());
        self
    }

    /// Whether this violation is certain enough to influence a block.
    pub fn meets_confidence(&self, min_confidence: f64) -> bool {
        self.confidence >= min_confidence
    }

    /// Reject scores outside their scales.
    pub fn validate(&self) -> GovernanceResult<()> {
        if !self.severity.is_finite() || !(0.0..=MAX_SEVERITY).contains(&self.severity) {
            return Err(GovernanceError::Invariant(format!(
                "violation {} from rule '{}' has severity {} outside 0-10",
                self.id, self.rule_id, self.severity
            )));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(GovernanceError::Invariant(format!(
                "violation {} from rule '{}' has confidence {} outside 0-1",
                self.id, self.rule_id, self.confidence
            )));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::violation;
    use super::*;

    #[test]
    fn test_violation_type_serialization() {
        let json = serde_json::to_string(&ViolationType::HateSpeech).unwrap();
        assert_eq!(json, "\"hate_speech\"");
        assert_eq!(
            "HATE_SPEECH".parse::<ViolationType>().unwrap(),
            ViolationType::HateSpeech
        );
        assert!("spam".parse::<ViolationType>().is_err());
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(SeverityLevel::from_score(0.0), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_score(4.0), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_score(7.5), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(9.5), SeverityLevel::Critical);
        assert!(SeverityLevel::Critical > SeverityLevel::High);
    }

    #[test]
    fn test_content_id_is_deterministic() {
        let a = Violation::content_id("violence.harm", TextSource::Input, 0, 11);
        let b = Violation::content_id("violence.harm", TextSource::Input, 0, 11);
        let c = Violation::content_id("violence.harm", TextSource::Output, 0, 11);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scoping_separates_interactions() {
        let v = violation(ViolationType::Pii, 5.0, 0.9);
        let first = v.clone().scoped_to(Uuid::new_v4());
        let second = v.scoped_to(Uuid::new_v4());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(violation(ViolationType::Bias, 6.0, 0.7).validate().is_ok());
        assert!(violation(ViolationType::Bias, 10.5, 0.7).validate().is_err());
        assert!(violation(ViolationType::Bias, 6.0, 1.2).validate().is_err());
        assert!(violation(ViolationType::Bias, f64::NAN, 0.7).validate().is_err());
    }
}
