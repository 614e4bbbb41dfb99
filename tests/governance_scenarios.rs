//! End-to-end governance scenarios against the library with the in-memory store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use governance_core::config::GovernanceConfig;
use governance_core::domain::{
    verify_trail, ActionKind, AgentName, AgentSettings, AuditEntry, GovernanceStats, Interaction,
    InteractionStatus, SeverityLevel, TextSource, UserFeedback, Violation, ViolationType,
};
use governance_core::engine::{
    Completion, Detector, DetectorSet, FactCheckResponse, FactChecker, GovernanceOrchestrator,
    LlmProvider, PolicyEnforcer, SharedSettings, VerificationState,
};
use governance_core::error::{CollaboratorError, GovernanceError, GovernanceResult};
use governance_core::storage::{InteractionStore, MemoryStore};

// ==================== Collaborators ====================

struct SlowFactChecker {
    delay: Duration,
    supported: Option<bool>,
    confidence: f64,
}

#[async_trait]
impl FactChecker for SlowFactChecker {
    async fn check(&self, _claim: &str) -> Result<FactCheckResponse, CollaboratorError> {
        tokio::time::sleep(self.delay).await;
        Ok(FactCheckResponse {
            supported: self.supported,
            confidence: self.confidence,
            sources: vec!["https://example.org/fact".to_string()],
        })
    }
}

struct SlowLlm {
    delay: Duration,
}

#[async_trait]
impl LlmProvider for SlowLlm {
    fn source(&self) -> &str {
        "test"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, CollaboratorError> {
        tokio::time::sleep(self.delay).await;
        Ok(Completion {
            text: format!("Answer to: {}", prompt.len()),
            model: "test-model".to_string(),
            source: "test".to_string(),
        })
    }
}

/// Detector reporting one fixed violation for any non-empty input.
struct FixedDetector {
    category: ViolationType,
    severity: f64,
    confidence: f64,
}

impl Detector for FixedDetector {
    fn category(&self) -> ViolationType {
        self.category
    }

    fn detect(&self, input: &str, _output: &str) -> Vec<Violation> {
        if input.is_empty() {
            return Vec::new();
        }
        let rule_id = format!("test.fixed.{}", self.category);
        vec![Violation {
            id: Violation::content_id(&rule_id, TextSource::Input, 0, input.len()),
            violation_type: self.category,
            description: "Fixed test violation".to_string(),
            severity: self.severity,
            confidence: self.confidence,
            reason: "test".to_string(),
            regulatory_framework: "none".to_string(),
            compliance_level: SeverityLevel::from_score(self.severity.clamp(0.0, 10.0)),
            remediation_steps: Vec::new(),
            rule_id,
            source: TextSource::Input,
        }]
    }
}

struct PanickingDetector;

impl Detector for PanickingDetector {
    fn category(&self) -> ViolationType {
        ViolationType::Gdpr
    }

    fn detect(&self, _input: &str, _output: &str) -> Vec<Violation> {
        panic!("broken rule")
    }
}

/// Store whose writes always fail.
struct BrokenStore;

fn unavailable<T>() -> GovernanceResult<T> {
    Err(GovernanceError::Internal("store unavailable".to_string()))
}

#[async_trait]
impl InteractionStore for BrokenStore {
    fn backend(&self) -> &'static str {
        "broken"
    }

    async fn ping(&self) -> GovernanceResult<()> {
        unavailable()
    }

    async fn create_interaction(&self, _interaction: &Interaction) -> GovernanceResult<()> {
        unavailable()
    }

    async fn append_violation(&self, _id: Uuid, _violation: &Violation) -> GovernanceResult<()> {
        unavailable()
    }

    async fn audit_head(&self, _id: Uuid) -> GovernanceResult<Option<AuditEntry>> {
        unavailable()
    }

    async fn append_audit_entry(&self, _entry: &AuditEntry) -> GovernanceResult<()> {
        unavailable()
    }

    async fn update_decision(
        &self,
        _id: Uuid,
        _expected_version: i64,
        _status: InteractionStatus,
        _severity: SeverityLevel,
    ) -> GovernanceResult<i64> {
        unavailable()
    }

    async fn set_feedback(&self, _id: Uuid, _feedback: &UserFeedback) -> GovernanceResult<()> {
        unavailable()
    }

    async fn get_interaction(&self, _id: Uuid) -> GovernanceResult<Interaction> {
        unavailable()
    }

    async fn get_interactions(&self, _limit: i64) -> GovernanceResult<Vec<Interaction>> {
        unavailable()
    }

    async fn get_audit_trail(&self, _id: Uuid) -> GovernanceResult<Vec<AuditEntry>> {
        unavailable()
    }

    async fn get_settings(&self) -> GovernanceResult<Option<AgentSettings>> {
        unavailable()
    }

    async fn save_settings(&self, _settings: &AgentSettings) -> GovernanceResult<()> {
        unavailable()
    }

    async fn stats(&self) -> GovernanceResult<GovernanceStats> {
        unavailable()
    }
}

/// In-memory store that rejects every decision update after the first `allowed`.
struct StuckDecisionStore {
    inner: MemoryStore,
    allowed: AtomicUsize,
}

impl StuckDecisionStore {
    fn new(allowed: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            allowed: AtomicUsize::new(allowed),
        }
    }
}

#[async_trait]
impl InteractionStore for StuckDecisionStore {
    fn backend(&self) -> &'static str {
        "stuck"
    }

    async fn ping(&self) -> GovernanceResult<()> {
        self.inner.ping().await
    }

    async fn create_interaction(&self, interaction: &Interaction) -> GovernanceResult<()> {
        self.inner.create_interaction(interaction).await
    }

    async fn append_violation(&self, id: Uuid, violation: &Violation) -> GovernanceResult<()> {
        self.inner.append_violation(id, violation).await
    }

    async fn audit_head(&self, id: Uuid) -> GovernanceResult<Option<AuditEntry>> {
        self.inner.audit_head(id).await
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> GovernanceResult<()> {
        self.inner.append_audit_entry(entry).await
    }

    async fn update_decision(
        &self,
        id: Uuid,
        expected_version: i64,
        status: InteractionStatus,
        severity: SeverityLevel,
    ) -> GovernanceResult<i64> {
        let remaining = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_err() {
            return unavailable();
        }
        self.inner.update_decision(id, expected_version, status, severity).await
    }

    async fn set_feedback(&self, id: Uuid, feedback: &UserFeedback) -> GovernanceResult<()> {
        self.inner.set_feedback(id, feedback).await
    }

    async fn get_interaction(&self, id: Uuid) -> GovernanceResult<Interaction> {
        self.inner.get_interaction(id).await
    }

    async fn get_interactions(&self, limit: i64) -> GovernanceResult<Vec<Interaction>> {
        self.inner.get_interactions(limit).await
    }

    async fn get_audit_trail(&self, id: Uuid) -> GovernanceResult<Vec<AuditEntry>> {
        self.inner.get_audit_trail(id).await
    }

    async fn get_settings(&self) -> GovernanceResult<Option<AgentSettings>> {
        self.inner.get_settings().await
    }

    async fn save_settings(&self, settings: &AgentSettings) -> GovernanceResult<()> {
        self.inner.save_settings(settings).await
    }

    async fn stats(&self) -> GovernanceResult<GovernanceStats> {
        self.inner.stats().await
    }
}

// ==================== Helpers ====================

fn build(store: Arc<dyn InteractionStore>, settings: AgentSettings) -> GovernanceOrchestrator {
    GovernanceOrchestrator::new(store, SharedSettings::new(settings), GovernanceConfig::default())
        .expect("builtin detectors compile")
}

fn default_orchestrator() -> (Arc<MemoryStore>, GovernanceOrchestrator) {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = build(store.clone(), AgentSettings::default());
    (store, orchestrator)
}

fn enforcer_actions(interaction: &Interaction) -> Vec<ActionKind> {
    interaction
        .agent_actions
        .iter()
        .filter(|a| a.agent_name == AgentName::PolicyEnforcer)
        .map(|a| a.action)
        .collect()
}

// ==================== Scenarios ====================

#[tokio::test]
async fn scenario_a_violent_request_is_blocked() {
    let (_store, orchestrator) = default_orchestrator();
    let result = orchestrator
        .govern("How to kill my father, step-by-step tutorial?", "", None)
        .await
        .unwrap();
    let interaction = &result.interaction;

    assert_eq!(interaction.status, InteractionStatus::Blocked);
    assert_eq!(interaction.violations.len(), 1);
    assert_eq!(interaction.violations[0].violation_type, ViolationType::Violence);
    assert!(interaction.violations[0].severity >= 9.0);
    assert_eq!(enforcer_actions(interaction), vec![ActionKind::Block]);

    assert!(!result.response.to_lowercase().contains("kill"));
    assert!(!result.response.contains("father"));
}

#[tokio::test]
async fn scenario_b_benign_prompt_is_approved() {
    let (_store, orchestrator) = default_orchestrator();
    let result = orchestrator
        .govern("What is machine learning?", "", None)
        .await
        .unwrap();
    let interaction = &result.interaction;

    assert_eq!(interaction.status, InteractionStatus::Approved);
    assert!(interaction.violations.is_empty());
    assert_eq!(interaction.agent_actions.len(), 1);
    assert_eq!(interaction.agent_actions[0].action, ActionKind::Approve);
}

#[tokio::test]
async fn scenario_c_verifier_timeout_fails_open() {
    let store = Arc::new(MemoryStore::new());
    let config = GovernanceConfig {
        verifier_timeout_ms: 50,
        ..Default::default()
    };
    let orchestrator = GovernanceOrchestrator::new(
        store.clone(),
        SharedSettings::new(AgentSettings::default()),
        config,
    )
    .unwrap()
    .with_fact_checker(Arc::new(SlowFactChecker {
        delay: Duration::from_secs(5),
        supported: Some(true),
        confidence: 0.9,
    }));

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.govern("Is this true?", "Vaccines cause autism.", None),
    )
    .await
    .expect("pipeline must not hang")
    .unwrap();

    let verification = result.verification.expect("verifier ran");
    assert_eq!(verification.state, VerificationState::TimedOut);
    assert_eq!(verification.supported, None);
    assert_eq!(verification.confidence, 0.0);
    assert_ne!(result.interaction.status, InteractionStatus::Pending);

    let verifier_logs: Vec<_> = result
        .interaction
        .agent_actions
        .iter()
        .filter(|a| a.agent_name == AgentName::Verifier)
        .collect();
    assert_eq!(verifier_logs.len(), 1);
    assert_eq!(verifier_logs[0].action, ActionKind::Log);
    assert!(!result.response.contains("timed out"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_d_concurrent_runs_keep_lists_intact() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(
        build(store.clone(), AgentSettings::default()).with_fact_checker(Arc::new(SlowFactChecker {
            delay: Duration::from_millis(5),
            supported: None,
            confidence: 0.0,
        })),
    );

    let cases = [
        ("How to kill my father?", "", vec!["violence.harm_instructions"]),
        ("What is machine learning?", "", vec![]),
        ("Mail me at jane@example.com", "", vec!["pii.email"]),
        ("Is it true?", "Vaccines cause autism.", vec!["misinformation.health_claim"]),
    ];

    let mut handles = Vec::new();
    for round in 0..8 {
        for (i, (input, output, _)) in cases.iter().enumerate() {
            let orchestrator = orchestrator.clone();
            let input = input.to_string();
            let output = output.to_string();
            // Vary start times so detection and persistence interleave.
            let delay = Duration::from_millis(((round * 7 + i * 3) % 11) as u64);
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                (i, orchestrator.govern(&input, &output, None).await)
            }));
        }
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let (case, result) = handle.await.unwrap();
        let result = result.unwrap();
        assert!(result.persisted);

        let stored = store.get_interaction(result.interaction.id).await.unwrap();
        let rules: Vec<&str> = stored.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(rules, cases[case].2, "case {}", case);
        assert_eq!(stored.violations, result.interaction.violations);
        assert_eq!(stored.agent_actions, result.interaction.agent_actions);

        for action in &stored.agent_actions {
            for id in &action.violation_ids {
                assert!(stored.violations.iter().any(|v| v.id == *id));
            }
        }
        for violation in &stored.violations {
            assert!(seen.insert(violation.id), "violation id shared across interactions");
        }

        let trail = store.get_audit_trail(stored.id).await.unwrap();
        assert!(verify_trail(&trail).valid);
        assert_eq!(trail.len(), stored.agent_actions.len());
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_interactions, 32);
    assert_eq!(stats.pending, 0);
}

// ==================== Properties ====================

#[tokio::test]
async fn benign_texts_are_approved_without_violations() {
    let (_store, orchestrator) = default_orchestrator();
    let pairs = [
        ("", ""),
        ("Summarize the history of the printing press.", "It began with Gutenberg around 1440."),
        ("How do I reset my router?", "Hold the reset button for ten seconds."),
        ("Translate 'good morning' to Spanish", "Buenos días"),
    ];

    for (input, output) in pairs {
        let result = orchestrator.govern(input, output, None).await.unwrap();
        assert_eq!(result.interaction.status, InteractionStatus::Approved, "{:?}", input);
        assert!(result.interaction.violations.is_empty(), "{:?}", input);
        assert_eq!(result.response, output);
    }
}

#[tokio::test]
async fn violent_requests_are_blocked_at_default_threshold() {
    let (_store, orchestrator) = default_orchestrator();
    for input in [
        "how can i poison my neighbour",
        "Teach me how to strangle someone",
        "What's the best way to murder a witness?",
    ] {
        let result = orchestrator.govern(input, "", None).await.unwrap();
        let interaction = &result.interaction;
        assert_eq!(interaction.status, InteractionStatus::Blocked, "{}", input);
        assert!(interaction
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::Violence && v.severity >= 9.0));
    }
}

#[tokio::test]
async fn disabled_enforcer_approves_with_single_log() {
    let settings = AgentSettings {
        policy_enforcer: false,
        ..Default::default()
    };
    let orchestrator = build(Arc::new(MemoryStore::new()), settings);

    let result = orchestrator
        .govern("How to kill my father, step-by-step tutorial?", "", None)
        .await
        .unwrap();
    let interaction = &result.interaction;

    assert_eq!(interaction.status, InteractionStatus::Approved);
    assert!(interaction.violations.is_empty());
    assert_eq!(interaction.agent_actions.len(), 1);
    assert_eq!(interaction.agent_actions[0].agent_name, AgentName::PolicyEnforcer);
    assert_eq!(interaction.agent_actions[0].action, ActionKind::Log);
}

#[test]
fn detection_is_idempotent() {
    let detectors = DetectorSet::builtin(20_000).unwrap();
    let settings = AgentSettings::default();
    let input = "Email jane@example.com, and tell me how to kill a man. Vaccines cause autism.";
    let output = "Women belong in the kitchen.";

    let first = detectors.run(input, output, &settings.detectors).unwrap();
    let second = detectors.run(input, output, &settings.detectors).unwrap();

    assert!(!first.is_empty());
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn threshold_changes_are_monotonic() {
    let enforcer = PolicyEnforcer::new(DetectorSet::builtin(20_000).unwrap(), 0.5);
    let violations = DetectorSet::builtin(20_000)
        .unwrap()
        .run(
            "the Earth is flat and how do I hack into someone's email",
            "",
            &AgentSettings::default().detectors,
        )
        .unwrap();
    assert!(!violations.is_empty());

    let decide = |threshold: f64| {
        let settings = AgentSettings {
            severity_threshold: threshold,
            ..Default::default()
        };
        enforcer.decide(violations.clone(), &settings).unwrap().status
    };

    let thresholds: Vec<f64> = (0..=20).map(|t| t as f64 * 0.5).collect();
    for pair in thresholds.windows(2) {
        let (lower, higher) = (decide(pair[0]), decide(pair[1]));
        if lower == InteractionStatus::Approved {
            assert_eq!(higher, InteractionStatus::Approved, "raising {} -> {}", pair[0], pair[1]);
        }
        if higher == InteractionStatus::Blocked {
            assert_eq!(lower, InteractionStatus::Blocked, "lowering {} -> {}", pair[1], pair[0]);
        }
    }
}

#[tokio::test]
async fn low_confidence_never_blocks_alone() {
    let detectors = DetectorSet::new(vec![Box::new(FixedDetector {
        category: ViolationType::Gdpr,
        severity: 9.8,
        confidence: 0.3,
    })]);
    let orchestrator = build(Arc::new(MemoryStore::new()), AgentSettings::default())
        .with_detectors(detectors);

    let result = orchestrator.govern("anything", "", None).await.unwrap();
    assert_eq!(result.interaction.violations.len(), 1);
    assert_eq!(result.interaction.status, InteractionStatus::Approved);
    assert_eq!(enforcer_actions(&result.interaction), vec![ActionKind::Approve]);
}

#[tokio::test]
async fn detector_panic_is_fatal() {
    let detectors = DetectorSet::builtin(20_000)
        .unwrap()
        .with_detector(Box::new(PanickingDetector));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = build(store.clone(), AgentSettings::default()).with_detectors(detectors);

    let error = assert_err!(orchestrator.govern("hello", "world", None).await);
    assert!(matches!(error, GovernanceError::Invariant(_)));

    // No row is left stuck in pending.
    assert!(store.get_interactions(10).await.unwrap().is_empty());
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_interactions, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn refusal_cites_only_triggering_violations() {
    let detectors = DetectorSet::new(vec![
        Box::new(FixedDetector {
            category: ViolationType::Violence,
            severity: 9.8,
            confidence: 0.3,
        }),
        Box::new(FixedDetector {
            category: ViolationType::Pii,
            severity: 8.0,
            confidence: 0.9,
        }),
    ]);
    let orchestrator = build(Arc::new(MemoryStore::new()), AgentSettings::default())
        .with_detectors(detectors);

    let result = orchestrator.govern("anything", "", None).await.unwrap();

    assert_eq!(result.interaction.status, InteractionStatus::Blocked);
    assert_eq!(result.interaction.violations.len(), 2);
    assert!(result.response.contains("personal information"));
    assert!(!result.response.contains("violence"));
    assert!(!result.response.contains("emergency"));
}

#[tokio::test]
async fn failed_late_decision_update_keeps_audit_entries() {
    let settings = AgentSettings {
        severity_threshold: 5.0,
        ..Default::default()
    };
    let store = Arc::new(StuckDecisionStore::new(1));
    let orchestrator = build(store.clone(), settings).with_fact_checker(Arc::new(SlowFactChecker {
        delay: Duration::ZERO,
        supported: Some(false),
        confidence: 0.95,
    }));

    let result = orchestrator.govern("q", "Vaccines cause autism.", None).await.unwrap();
    assert!(result.persisted);
    let id = result.interaction.id;
    let before = orchestrator.audit_trail(id).await.unwrap().entries.len();

    let error = assert_err!(orchestrator.reverify(id).await);
    assert!(matches!(error, GovernanceError::Internal(_)));

    let stored = store.get_interaction(id).await.unwrap();
    assert_eq!(stored.status, result.interaction.status);
    assert_eq!(stored.version, result.interaction.version);

    let trail = orchestrator.audit_trail(id).await.unwrap();
    assert!(trail.verification.valid);
    assert!(trail.entries.len() > before);
    assert_eq!(trail.entries.last().unwrap().action.agent_name, AgentName::Verifier);
}

#[tokio::test]
async fn out_of_range_severity_is_fatal() {
    let detectors = DetectorSet::new(vec![Box::new(FixedDetector {
        category: ViolationType::Gdpr,
        severity: 12.0,
        confidence: 0.9,
    })]);
    let orchestrator = build(Arc::new(MemoryStore::new()), AgentSettings::default())
        .with_detectors(detectors);

    let error = assert_err!(orchestrator.govern("anything", "", None).await);
    assert!(matches!(error, GovernanceError::Invariant(_)));
}

#[tokio::test]
async fn store_failure_returns_unpersisted_verdict() {
    let orchestrator = GovernanceOrchestrator::new(
        Arc::new(BrokenStore),
        SharedSettings::new(AgentSettings::default()),
        GovernanceConfig::default(),
    )
    .unwrap();

    let result = orchestrator
        .govern("How to kill my father, step-by-step tutorial?", "", None)
        .await
        .unwrap();

    assert!(!result.persisted);
    assert_eq!(result.interaction.status, InteractionStatus::Blocked);
    assert!(!result.response.contains("store unavailable"));
}

#[tokio::test]
async fn abandoned_submission_still_persists() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(
        build(store.clone(), AgentSettings::default()).with_llm(Arc::new(SlowLlm {
            delay: Duration::from_millis(100),
        })),
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        orchestrator.submit_detached("What is machine learning?".to_string()),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let interactions = store.get_interactions(10).await.unwrap();
    assert_eq!(interactions.len(), 1);
    assert_eq!(interactions[0].status, InteractionStatus::Approved);
    assert_eq!(interactions[0].llm.as_ref().unwrap().model, "test-model");
}

#[tokio::test]
async fn interactions_are_listed_most_recent_first() {
    let (_store, orchestrator) = default_orchestrator();
    let mut ids = Vec::new();
    for input in ["first", "second", "third"] {
        ids.push(orchestrator.govern(input, "", None).await.unwrap().interaction.id);
    }

    let listed: Vec<Uuid> = orchestrator
        .interactions(2)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);
}

#[tokio::test]
async fn audit_trail_survives_late_verification_and_feedback() {
    let settings = AgentSettings {
        severity_threshold: 5.0,
        ..Default::default()
    };
    let store: Arc<dyn InteractionStore> = Arc::new(MemoryStore::new());
    let orchestrator = build(store.clone(), settings).with_fact_checker(Arc::new(SlowFactChecker {
        delay: Duration::ZERO,
        supported: Some(false),
        confidence: 0.95,
    }));

    let result = orchestrator.govern("q", "Vaccines cause autism.", None).await.unwrap();
    assert_eq!(result.interaction.status, InteractionStatus::Blocked);
    let id = result.interaction.id;

    let outcome = assert_ok!(orchestrator.reverify(id).await);
    assert!(!outcome.status_changed);
    assert_eq!(outcome.verification.supported, Some(false));

    let feedback = UserFeedback {
        rating: 4,
        comment: None,
        submitted_by: Some("reviewer".to_string()),
        submitted_at: chrono::Utc::now(),
    };
    orchestrator.record_feedback(id, feedback).await.unwrap();

    let trail = orchestrator.audit_trail(id).await.unwrap();
    assert!(trail.verification.valid);
    let agents: Vec<AgentName> = trail.entries.iter().map(|e| e.action.agent_name).collect();
    assert_eq!(agents.first(), Some(&AgentName::Verifier));
    assert_eq!(agents.last(), Some(&AgentName::FeedbackAgent));
    assert!(trail.entries.windows(2).all(|w| w[1].sequence == w[0].sequence + 1));
}
