//! Verifier - conditional fact-check of borderline content.
//!
//! The external check is bounded by a fixed timeout and always resolves.
//! Collaborator failures are fail-open: they leave the violations untouched
//! and are recorded as a `log` action.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::FactCheckConfig;
use crate::domain::{ActionKind, AgentAction, AgentName, Violation, ViolationType};
use crate::error::{CollaboratorError, GovernanceError, GovernanceResult};

/// Answer from a fact-check provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckResponse {
    /// `None` when the provider found no evidence either way.
    #[serde(default)]
    pub supported: Option<bool>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// External fact-checking collaborator.
#[async_trait]
pub trait FactChecker: Send + Sync {
    async fn check(&self, claim: &str) -> Result<FactCheckResponse, CollaboratorError>;
}

/// Fact checker over a JSON HTTP endpoint.
///
/// Sends `{"claim": ...}` and expects a [`FactCheckResponse`] body.
pub struct HttpFactChecker {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    claim: &'a str,
}

impl HttpFactChecker {
    pub fn new(config: &FactCheckConfig, timeout: Duration) -> GovernanceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GovernanceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            client,
        })
    }
}

#[async_trait]
impl FactChecker for HttpFactChecker {
    async fn check(&self, claim: &str) -> Result<FactCheckResponse, CollaboratorError> {
        let mut request = self.client.post(&self.endpoint).json(&CheckRequest { claim });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { status, body });
        }

        response
            .json::<FactCheckResponse>()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))
    }
}

/// How a verification attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// The provider supported or refuted the claim.
    Resolved,
    /// The provider answered but found no evidence.
    NoEvidence,
    /// The provider errored or answered with garbage.
    Failed,
    /// The provider did not answer within the ceiling.
    TimedOut,
    /// No provider is configured.
    NotConfigured,
}

impl VerificationState {
    /// Whether the collaborator failed to produce an answer.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            VerificationState::Failed | VerificationState::TimedOut | VerificationState::NotConfigured
        )
    }
}

/// Result of one verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Verification {
    pub state: VerificationState,
    /// `None` means unknown.
    pub supported: Option<bool>,
    pub confidence: f64,
    pub sources: Vec<String>,
    /// Failure detail. Audit only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Verification {
    fn neutral(state: VerificationState, detail: Option<String>) -> Self {
        Self {
            state,
            supported: None,
            confidence: 0.0,
            sources: Vec::new(),
            detail,
        }
    }
}

/// Verification plus its effect on the violations.
#[derive(Debug, Clone)]
pub struct VerifierOutcome {
    pub verification: Verification,
    pub action: AgentAction,
    /// Number of violations whose confidence changed.
    pub adjusted: usize,
}

/// Secondary agent that folds fact-check results into violation confidence.
pub struct Verifier {
    checker: Option<Arc<dyn FactChecker>>,
    timeout: Duration,
    band_min: f64,
}

impl Verifier {
    pub fn new(checker: Option<Arc<dyn FactChecker>>, timeout: Duration, band_min: f64) -> Self {
        Self {
            checker,
            timeout,
            band_min,
        }
    }

    /// Whether an evaluation falls in the verification band or carries a
    /// checkable claim.
    pub fn should_verify(&self, decision_severity: f64, violations: &[Violation], threshold: f64) -> bool {
        let in_band = decision_severity >= self.band_min && decision_severity < threshold;
        in_band || violations.iter().any(|v| is_checkable(v.violation_type))
    }

    /// Check one claim. Always resolves, never longer than the timeout.
    pub async fn verify(&self, claim: &str) -> Verification {
        let Some(checker) = &self.checker else {
            return Verification::neutral(VerificationState::NotConfigured, Some("no fact-check provider configured".to_string()));
        };

        match tokio::time::timeout(self.timeout, checker.check(claim)).await {
            Err(_) => Verification::neutral(
                VerificationState::TimedOut,
                Some(CollaboratorError::Timeout(self.timeout.as_millis() as u64).to_string()),
            ),
            Ok(Err(e)) => Verification::neutral(VerificationState::Failed, Some(e.to_string())),
            Ok(Ok(response)) => {
                if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
                    return Verification::neutral(
                        VerificationState::Failed,
                        Some(format!("provider confidence {} outside 0-1", response.confidence)),
                    );
                }
                let state = match response.supported {
                    Some(_) => VerificationState::Resolved,
                    None => VerificationState::NoEvidence,
                };
                Verification {
                    state,
                    supported: response.supported,
                    confidence: if state == VerificationState::Resolved {
                        response.confidence
                    } else {
                        0.0
                    },
                    sources: response.sources,
                    detail: None,
                }
            }
        }
    }

    /// Verify `claim` and fold the signal into the checkable violations.
    ///
    /// A refuted claim raises their confidence to at least the provider's;
    /// a supported claim scales it down by the provider's confidence.
    pub async fn review(&self, claim: &str, violations: &mut [Violation]) -> VerifierOutcome {
        let verification = self.verify(claim).await;

        if verification.state.is_failure() {
            tracing::warn!(
                state = ?verification.state,
                detail = verification.detail.as_deref().unwrap_or_default(),
                "Verification failed, continuing without it"
            );
            let action = AgentAction::new(
                AgentName::Verifier,
                ActionKind::Log,
                format!(
                    "Verification {}: {}",
                    state_label(verification.state),
                    verification.detail.as_deref().unwrap_or("no detail")
                ),
            );
            return VerifierOutcome {
                verification,
                action,
                adjusted: 0,
            };
        }

        let mut adjusted = 0;
        if let Some(supported) = verification.supported {
            for violation in violations.iter_mut().filter(|v| is_checkable(v.violation_type)) {
                let folded = if supported {
                    violation.confidence * (1.0 - verification.confidence)
                } else {
                    violation.confidence.max(verification.confidence)
                };
                if folded != violation.confidence {
                    violation.confidence = folded;
                    adjusted += 1;
                }
            }
        }

        let (kind, details) = match verification.supported {
            Some(false) => (
                ActionKind::Flag,
                format!(
                    "Claim refuted (confidence {:.2}, {} source(s)); raised confidence of {} violation(s)",
                    verification.confidence,
                    verification.sources.len(),
                    adjusted
                ),
            ),
            Some(true) => (
                ActionKind::Verify,
                format!(
                    "Claim supported (confidence {:.2}, {} source(s)); lowered confidence of {} violation(s)",
                    verification.confidence,
                    verification.sources.len(),
                    adjusted
                ),
            ),
            None => (
                ActionKind::Verify,
                "No evidence found; violations unchanged".to_string(),
            ),
        };

        let checked: Vec<&Violation> = violations.iter().filter(|v| is_checkable(v.violation_type)).collect();
        let action = AgentAction::new(AgentName::Verifier, kind, details).triggered_by(checked);

        tracing::debug!(
            state = ?verification.state,
            supported = ?verification.supported,
            adjusted,
            "Verification complete"
        );

        VerifierOutcome {
            verification,
            action,
            adjusted,
        }
    }
}

/// Categories a fact-checker can speak to.
fn is_checkable(violation_type: ViolationType) -> bool {
    matches!(
        violation_type,
        ViolationType::Misinformation | ViolationType::Hallucination
    )
}

fn state_label(state: VerificationState) -> &'static str {
    match state {
        VerificationState::Resolved => "resolved",
        VerificationState::NoEvidence => "found no evidence",
        VerificationState::Failed => "failed",
        VerificationState::TimedOut => "timed out",
        VerificationState::NotConfigured => "not configured",
    }
}
