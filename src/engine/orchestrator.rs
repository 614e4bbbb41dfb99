//! Governance Orchestrator - sequences the agents for one interaction.
//!
//! Stages run strictly in order:
//! Received -> Detecting -> (Verifying) -> Deciding -> Responding -> Logged -> Persisted.
//!
//! Detector and enforcer errors are fatal for the run. Collaborator failures
//! (LLM, fact-checker) degrade per their own contracts. A failing store marks
//! the result unpersisted but the verdict is still returned. Nothing is
//! written to the store until a verdict exists.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::GovernanceConfig;
use crate::domain::{
    verify_trail, ActionKind, AgentAction, AgentName, AgentSettings, AuditEntry, GovernanceStats,
    Interaction, InteractionStatus, LlmProvenance, TrailVerification, UpdateSettingsRequest,
    UserFeedback, Violation,
};
use crate::engine::{
    complete_or_fallback, AuditLogger, DetectorSet, FactChecker, FeedbackAgent, LlmProvider,
    PolicyEnforcer, ResponseAgent, SharedSettings, Verification, Verifier,
};
use crate::error::{GovernanceError, GovernanceResult};
use crate::storage::InteractionStore;

/// Attempts for a late verification that keeps losing the version race.
const MAX_REVERIFY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineStage {
    Received,
    Detecting,
    Verifying,
    Deciding,
    Responding,
    Logged,
    Persisted,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Received => write!(f, "received"),
            PipelineStage::Detecting => write!(f, "detecting"),
            PipelineStage::Verifying => write!(f, "verifying"),
            PipelineStage::Deciding => write!(f, "deciding"),
            PipelineStage::Responding => write!(f, "responding"),
            PipelineStage::Logged => write!(f, "logged"),
            PipelineStage::Persisted => write!(f, "persisted"),
        }
    }
}

fn enter(interaction_id: Uuid, stage: PipelineStage) {
    tracing::debug!(interaction_id = %interaction_id, stage = %stage, "Pipeline stage");
}

/// Final result of one governed interaction.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GovernedResponse {
    pub interaction: Interaction,
    /// The text to show the end user.
    pub response: String,
    /// False when the store rejected a write; the verdict is still valid.
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

/// Result of a late verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReverifyOutcome {
    pub interaction: Interaction,
    pub verification: Verification,
    pub status_changed: bool,
}

/// Stored audit trail plus its integrity check.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditTrail {
    pub interaction_id: Uuid,
    pub entries: Vec<AuditEntry>,
    pub verification: TrailVerification,
}

/// Sequences detectors, enforcer, verifier, responder and audit logger.
pub struct GovernanceOrchestrator {
    enforcer: PolicyEnforcer,
    verifier: Verifier,
    responder: ResponseAgent,
    feedback: FeedbackAgent,
    audit: AuditLogger,
    llm: Option<Arc<dyn LlmProvider>>,
    store: Arc<dyn InteractionStore>,
    settings: SharedSettings,
    config: GovernanceConfig,
}

impl GovernanceOrchestrator {
    /// Orchestrator with the built-in detectors and no external collaborators.
    pub fn new(
        store: Arc<dyn InteractionStore>,
        settings: SharedSettings,
        config: GovernanceConfig,
    ) -> GovernanceResult<Self> {
        let detectors = DetectorSet::builtin(config.max_text_chars)?;
        Ok(Self {
            enforcer: PolicyEnforcer::new(detectors, config.min_confidence_to_block),
            verifier: Verifier::new(
                None,
                Duration::from_millis(config.verifier_timeout_ms),
                config.verification_band_min,
            ),
            responder: ResponseAgent::new(),
            feedback: FeedbackAgent::new(),
            audit: AuditLogger::new(store.clone()),
            llm: None,
            store,
            settings,
            config,
        })
    }

    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    pub fn with_fact_checker(mut self, checker: Arc<dyn FactChecker>) -> Self {
        self.verifier = Verifier::new(
            Some(checker),
            Duration::from_millis(self.config.verifier_timeout_ms),
            self.config.verification_band_min,
        );
        self
    }

    pub fn with_detectors(mut self, detectors: DetectorSet) -> Self {
        self.enforcer = PolicyEnforcer::new(detectors, self.config.min_confidence_to_block);
        self
    }

    pub fn store(&self) -> &Arc<dyn InteractionStore> {
        &self.store
    }

    /// Ask the LLM for an answer to `prompt`, then govern the pair.
    pub async fn submit(&self, prompt: &str) -> GovernanceResult<GovernedResponse> {
        let (output, provenance) = complete_or_fallback(
            self.llm.as_deref(),
            prompt,
            Duration::from_millis(self.config.llm_timeout_ms),
            &self.config.llm_fallback_text,
        )
        .await;

        self.govern(prompt, &output, Some(provenance)).await
    }

    /// Run [`submit`](Self::submit) on its own task.
    ///
    /// Dropping the returned future does not stop the pipeline; the verdict
    /// is still computed and persisted.
    pub async fn submit_detached(self: &Arc<Self>, prompt: String) -> GovernanceResult<GovernedResponse> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.submit(&prompt).await })
            .await
            .map_err(|e| GovernanceError::Internal(format!("Pipeline task failed: {}", e)))?
    }

    /// Govern an existing input/output pair on its own task.
    pub async fn govern_detached(
        self: &Arc<Self>,
        input: String,
        output: String,
    ) -> GovernanceResult<GovernedResponse> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.govern(&input, &output, None).await })
            .await
            .map_err(|e| GovernanceError::Internal(format!("Pipeline task failed: {}", e)))?
    }

    /// Run the full pipeline for one input/output pair.
    pub async fn govern(
        &self,
        input: &str,
        output: &str,
        llm: Option<LlmProvenance>,
    ) -> GovernanceResult<GovernedResponse> {
        let settings = self.settings.snapshot().await;

        let mut interaction = Interaction::new(input, output);
        interaction.llm = llm;
        let id = interaction.id;
        enter(id, PipelineStage::Received);

        let mut actions = Vec::new();
        if let Some(error) = interaction.llm.as_ref().and_then(|l| l.error.as_deref()) {
            actions.push(AgentAction::new(
                AgentName::ResponseAgent,
                ActionKind::Log,
                format!("LLM call failed, governed fallback text instead: {}", error),
            ));
        }

        enter(id, PipelineStage::Detecting);
        let mut evaluation = self.enforcer.evaluate(input, output, &settings).map_err(|e| {
            tracing::error!(interaction_id = %id, error = %e, "Policy evaluation failed");
            e
        })?;

        let mut verification = None;
        if evaluation.enforced
            && settings.verifier
            && self.verifier.should_verify(
                evaluation.decision_severity,
                &evaluation.violations,
                settings.severity_threshold,
            )
        {
            enter(id, PipelineStage::Verifying);
            let outcome = self
                .verifier
                .review(claim_text(input, output), &mut evaluation.violations)
                .await;
            actions.push(outcome.action);
            verification = Some(outcome.verification);
            evaluation = self.enforcer.decide(evaluation.violations, &settings)?;
        }

        enter(id, PipelineStage::Deciding);
        let mut mapping = Vec::with_capacity(evaluation.violations.len());
        let violations: Vec<Violation> = evaluation
            .violations
            .into_iter()
            .map(|v| {
                let original = v.id;
                let scoped = v.scoped_to(id);
                mapping.push((original, scoped.id));
                scoped
            })
            .collect();
        actions.push(evaluation.action);
        for action in &mut actions {
            action.remap_violations(&mapping);
        }

        interaction.status = evaluation.status;
        interaction.severity = evaluation.severity;
        interaction.violations = violations;

        tracing::info!(
            interaction_id = %id,
            status = %interaction.status,
            severity = %interaction.severity,
            decision_severity = evaluation.decision_severity,
            violation_count = interaction.violations.len(),
            "Interaction governed"
        );

        // The refusal is built from the violations the block cites, never
        // from below-floor or below-threshold findings.
        let triggering: Vec<Violation> = actions
            .last()
            .map(|decision| {
                interaction
                    .violations
                    .iter()
                    .filter(|v| decision.violation_ids.contains(&v.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        enter(id, PipelineStage::Responding);
        let reply = self.responder.respond(
            output,
            interaction.status,
            &triggering,
            settings.response_agent,
        );
        if let Some(action) = reply.action {
            actions.push(action);
        }
        interaction.agent_actions = actions;

        let persisted = match self.persist(&interaction, &settings).await {
            Ok(version) => {
                interaction.version = version;
                true
            }
            Err(e) => {
                tracing::warn!(interaction_id = %id, error = %e, "Failed to persist interaction, returning unpersisted verdict");
                false
            }
        };

        Ok(GovernedResponse {
            interaction,
            response: reply.text,
            persisted,
            verification,
        })
    }

    /// Create the row, append violations and the audit trail, then patch the
    /// decision.
    ///
    /// Runs only once a verdict exists, so a fatal detection error never
    /// leaves a pending row behind.
    async fn persist(&self, interaction: &Interaction, settings: &AgentSettings) -> GovernanceResult<i64> {
        let mut pending = interaction.clone();
        pending.status = InteractionStatus::Pending;
        pending.version = 0;
        self.store.create_interaction(&pending).await?;

        for violation in &interaction.violations {
            self.store.append_violation(interaction.id, violation).await?;
        }
        self.audit
            .record_all(interaction.id, interaction.agent_actions.iter().cloned(), settings.audit_logger)
            .await?;
        enter(interaction.id, PipelineStage::Logged);

        let version = self
            .store
            .update_decision(interaction.id, interaction.version, interaction.status, interaction.severity)
            .await?;
        enter(interaction.id, PipelineStage::Persisted);
        Ok(version)
    }

    /// Re-run the Verifier on a stored interaction and patch its decision.
    ///
    /// Stored violations stay untouched; the adjusted confidences are
    /// recorded on the Verifier action.
    pub async fn reverify(&self, interaction_id: Uuid) -> GovernanceResult<ReverifyOutcome> {
        let settings = self.settings.snapshot().await;
        if !settings.verifier {
            return Err(GovernanceError::BadRequest("Verifier agent is disabled".to_string()));
        }
        if !settings.policy_enforcer {
            return Err(GovernanceError::BadRequest(
                "Policy enforcement is disabled".to_string(),
            ));
        }

        for attempt in 1..=MAX_REVERIFY_ATTEMPTS {
            let interaction = self.store.get_interaction(interaction_id).await?;
            if interaction.status == InteractionStatus::Pending {
                return Err(GovernanceError::Conflict(format!(
                    "Interaction {} is still being governed",
                    interaction_id
                )));
            }

            let mut violations = interaction.violations.clone();
            let outcome = self
                .verifier
                .review(claim_text(&interaction.input, &interaction.output), &mut violations)
                .await;
            let evaluation = self.enforcer.decide(violations, &settings)?;
            let status_changed = evaluation.status != interaction.status;

            // The trail is written before the decision moves, so a changed
            // status always has its audit entries. A lost race leaves a
            // verifier entry for the abandoned attempt.
            let mut actions = vec![outcome.action];
            if status_changed {
                actions.push(evaluation.action);
            }
            self.audit
                .record_all(interaction_id, actions, settings.audit_logger)
                .await?;

            match self
                .store
                .update_decision(interaction_id, interaction.version, evaluation.status, evaluation.severity)
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        interaction_id = %interaction_id,
                        status = %evaluation.status,
                        status_changed,
                        state = ?outcome.verification.state,
                        "Late verification applied"
                    );
                    return Ok(ReverifyOutcome {
                        interaction: self.store.get_interaction(interaction_id).await?,
                        verification: outcome.verification,
                        status_changed,
                    });
                }
                Err(GovernanceError::Conflict(_)) => {
                    tracing::debug!(interaction_id = %interaction_id, attempt, "Late verification lost version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(GovernanceError::Conflict(format!(
            "Interaction {} kept changing during verification",
            interaction_id
        )))
    }

    /// Attach advisory feedback. Never changes the decision.
    pub async fn record_feedback(
        &self,
        interaction_id: Uuid,
        feedback: UserFeedback,
    ) -> GovernanceResult<Interaction> {
        let settings = self.settings.snapshot().await;
        if !settings.feedback_agent {
            return Err(GovernanceError::BadRequest("Feedback agent is disabled".to_string()));
        }
        self.feedback.validate(&feedback)?;

        let interaction = self.store.get_interaction(interaction_id).await?;
        self.store.set_feedback(interaction_id, &feedback).await?;

        let action = self.feedback.review(&interaction, &feedback);
        self.audit
            .record(interaction_id, action, settings.audit_logger)
            .await?;

        self.store.get_interaction(interaction_id).await
    }

    pub async fn interaction(&self, interaction_id: Uuid) -> GovernanceResult<Interaction> {
        self.store.get_interaction(interaction_id).await
    }

    /// Most recent first.
    pub async fn interactions(&self, limit: i64) -> GovernanceResult<Vec<Interaction>> {
        self.store.get_interactions(limit).await
    }

    pub async fn audit_trail(&self, interaction_id: Uuid) -> GovernanceResult<AuditTrail> {
        let entries = self.store.get_audit_trail(interaction_id).await?;
        let verification = verify_trail(&entries);
        if !verification.valid {
            tracing::error!(
                interaction_id = %interaction_id,
                first_invalid = ?verification.first_invalid,
                "Audit trail failed integrity check"
            );
        }
        Ok(AuditTrail {
            interaction_id,
            entries,
            verification,
        })
    }

    pub async fn stats(&self) -> GovernanceResult<GovernanceStats> {
        self.store.stats().await
    }

    pub async fn settings(&self) -> Arc<AgentSettings> {
        self.settings.snapshot().await
    }

    pub async fn update_settings(
        &self,
        request: &UpdateSettingsRequest,
    ) -> GovernanceResult<Arc<AgentSettings>> {
        self.settings.update(request, self.store.as_ref()).await
    }
}

/// The text a fact-checker should look at: the output, or the prompt when
/// there is no output.
fn claim_text<'a>(input: &'a str, output: &'a str) -> &'a str {
    if output.trim().is_empty() {
        input
    } else {
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::llm::stubs::StubLlm;
    use crate::engine::verifier::stubs::StubFactChecker;
    use crate::storage::MemoryStore;

    fn orchestrator_with(store: Arc<dyn InteractionStore>, settings: AgentSettings) -> GovernanceOrchestrator {
        crate::logging::init_test();
        GovernanceOrchestrator::new(store, SharedSettings::new(settings), GovernanceConfig::default()).unwrap()
    }

    fn orchestrator() -> GovernanceOrchestrator {
        orchestrator_with(Arc::new(MemoryStore::new()), AgentSettings::default())
    }

    #[tokio::test]
    async fn test_blocked_interaction_is_persisted_with_trail() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .govern("How to kill my father, step-by-step tutorial?", "", None)
            .await
            .unwrap();

        assert!(result.persisted);
        assert_eq!(result.interaction.status, InteractionStatus::Blocked);
        assert_eq!(result.interaction.version, 1);
        assert!(!result.response.contains("father"));

        let stored = orchestrator.interaction(result.interaction.id).await.unwrap();
        assert_eq!(stored.status, InteractionStatus::Blocked);
        assert_eq!(stored.violations, result.interaction.violations);
        assert_eq!(stored.agent_actions, result.interaction.agent_actions);

        let block = &stored.agent_actions[0];
        assert_eq!(block.action, ActionKind::Block);
        assert!(!block.violation_ids.is_empty());
        assert!(block
            .violation_ids
            .iter()
            .all(|id| stored.violations.iter().any(|v| v.id == *id)));

        let trail = orchestrator.audit_trail(stored.id).await.unwrap();
        assert!(trail.verification.valid);
    }

    #[tokio::test]
    async fn test_violation_ids_not_shared_across_interactions() {
        let orchestrator = orchestrator();
        let a = orchestrator.govern("how to kill him", "", None).await.unwrap();
        let b = orchestrator.govern("how to kill him", "", None).await.unwrap();

        assert_ne!(a.interaction.violations[0].id, b.interaction.violations[0].id);
        assert_eq!(a.interaction.violations[0].rule_id, b.interaction.violations[0].rule_id);
    }

    #[tokio::test]
    async fn test_llm_failure_is_logged_and_fallback_governed() {
        let orchestrator = orchestrator().with_llm(Arc::new(StubLlm::failing()));
        let result = orchestrator.submit("What is machine learning?").await.unwrap();

        assert_eq!(result.interaction.status, InteractionStatus::Approved);
        assert_eq!(result.response, GovernanceConfig::default().llm_fallback_text);
        assert_eq!(result.interaction.llm.as_ref().unwrap().source, "fallback");

        let log = &result.interaction.agent_actions[0];
        assert_eq!(log.agent_name, AgentName::ResponseAgent);
        assert_eq!(log.action, ActionKind::Log);
        assert!(!result.response.contains("503"));
    }

    #[tokio::test]
    async fn test_submit_passes_approved_output_through() {
        let orchestrator = orchestrator().with_llm(Arc::new(StubLlm::answering("ML is a field of AI.")));
        let result = orchestrator.submit("What is machine learning?").await.unwrap();

        assert_eq!(result.response, "ML is a field of AI.");
        assert_eq!(result.interaction.llm.as_ref().unwrap().model, "stub-model");
    }

    #[tokio::test]
    async fn test_verification_can_unblock_at_strict_threshold() {
        let settings = AgentSettings {
            severity_threshold: 5.0,
            ..Default::default()
        };
        let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), settings.clone())
            .with_fact_checker(Arc::new(StubFactChecker::answering(Some(true), 0.9)));

        let result = orchestrator.govern("Is it true?", "Vaccines cause autism.", None).await.unwrap();
        assert_eq!(result.interaction.status, InteractionStatus::Approved);
        assert_eq!(result.verification.as_ref().unwrap().supported, Some(true));

        let unverified = orchestrator_with(Arc::new(MemoryStore::new()), settings)
            .govern("Is it true?", "Vaccines cause autism.", None)
            .await
            .unwrap();
        // Not configured: fail-open, detector confidence stands.
        assert_eq!(unverified.interaction.status, InteractionStatus::Blocked);
    }

    #[tokio::test]
    async fn test_reverify_patches_decision() {
        let store: Arc<dyn InteractionStore> = Arc::new(MemoryStore::new());
        let settings = AgentSettings {
            severity_threshold: 5.0,
            ..Default::default()
        };
        let first = orchestrator_with(store.clone(), settings.clone());
        let result = first.govern("q", "Vaccines cause autism.", None).await.unwrap();
        assert_eq!(result.interaction.status, InteractionStatus::Blocked);

        let later = orchestrator_with(store.clone(), settings)
            .with_fact_checker(Arc::new(StubFactChecker::answering(Some(true), 0.9)));
        let outcome = later.reverify(result.interaction.id).await.unwrap();

        assert!(outcome.status_changed);
        assert_eq!(outcome.interaction.status, InteractionStatus::Approved);
        assert_eq!(outcome.interaction.version, 2);
        // Append-only: original violations unchanged, two actions added.
        assert_eq!(outcome.interaction.violations, result.interaction.violations);
        assert_eq!(
            outcome.interaction.agent_actions.len(),
            result.interaction.agent_actions.len() + 2
        );
        assert!(later.audit_trail(result.interaction.id).await.unwrap().verification.valid);
    }

    #[tokio::test]
    async fn test_feedback_is_advisory_and_once() {
        let orchestrator = orchestrator();
        let result = orchestrator.govern("How to kill my father?", "", None).await.unwrap();
        let feedback = UserFeedback {
            rating: 1,
            comment: Some("this was a film plot".to_string()),
            submitted_by: None,
            submitted_at: chrono::Utc::now(),
        };

        let updated = orchestrator
            .record_feedback(result.interaction.id, feedback.clone())
            .await
            .unwrap();
        assert_eq!(updated.status, InteractionStatus::Blocked);
        let last = updated.agent_actions.last().unwrap();
        assert_eq!(last.agent_name, AgentName::FeedbackAgent);
        assert_eq!(last.action, ActionKind::Suggest);

        let again = orchestrator.record_feedback(result.interaction.id, feedback).await;
        assert!(matches!(again, Err(GovernanceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_feedback_rejected_when_agent_disabled() {
        let settings = AgentSettings {
            feedback_agent: false,
            ..Default::default()
        };
        let orchestrator = orchestrator_with(Arc::new(MemoryStore::new()), settings);
        let result = orchestrator.govern("hello", "hi", None).await.unwrap();

        let feedback = UserFeedback {
            rating: 5,
            comment: None,
            submitted_by: None,
            submitted_at: chrono::Utc::now(),
        };
        let outcome = orchestrator.record_feedback(result.interaction.id, feedback).await;
        assert!(matches!(outcome, Err(GovernanceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_settings_update_applies_to_next_run() {
        let orchestrator = orchestrator();
        let update = UpdateSettingsRequest {
            policy_enforcer: Some(false),
            ..Default::default()
        };
        orchestrator.update_settings(&update).await.unwrap();

        let result = orchestrator.govern("How to kill my father?", "", None).await.unwrap();
        assert_eq!(result.interaction.status, InteractionStatus::Approved);
        assert_eq!(result.interaction.agent_actions.len(), 1);
        assert_eq!(result.interaction.agent_actions[0].action, ActionKind::Log);
    }
}
