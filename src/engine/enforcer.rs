//! Policy Enforcer - aggregates detector output into a disposition.
//!
//! The decision is a pure function of the violation set, the confidence
//! floor and the severity threshold.

use crate::domain::{
    ActionKind, AgentAction, AgentName, AgentSettings, InteractionStatus, SeverityLevel, Violation,
};
use crate::engine::DetectorSet;
use crate::error::{GovernanceError, GovernanceResult};

/// Outcome of one enforcement pass.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Union of all enabled detectors' violations.
    pub violations: Vec<Violation>,
    pub status: InteractionStatus,
    /// Bucket of the highest violation severity, low when there are none.
    pub severity: SeverityLevel,
    /// Highest severity among violations that meet the confidence floor.
    pub decision_severity: f64,
    /// The single PolicyEnforcer action for this pass.
    pub action: AgentAction,
    /// False when enforcement was disabled and no detector ran.
    pub enforced: bool,
}

/// Runs the detector set and decides approve or block.
pub struct PolicyEnforcer {
    detectors: DetectorSet,
    min_confidence_to_block: f64,
}

impl PolicyEnforcer {
    pub fn new(detectors: DetectorSet, min_confidence_to_block: f64) -> Self {
        Self {
            detectors,
            min_confidence_to_block,
        }
    }

    pub fn min_confidence_to_block(&self) -> f64 {
        self.min_confidence_to_block
    }

    /// Detect and decide for one input/output pair.
    ///
    /// Errors only on a broken detector or an out-of-range score.
    pub fn evaluate(
        &self,
        input: &str,
        output: &str,
        settings: &AgentSettings,
    ) -> GovernanceResult<EvaluationResult> {
        if !settings.policy_enforcer {
            return Ok(EvaluationResult {
                violations: Vec::new(),
                status: InteractionStatus::Approved,
                severity: SeverityLevel::Low,
                decision_severity: 0.0,
                action: AgentAction::new(
                    AgentName::PolicyEnforcer,
                    ActionKind::Log,
                    "Policy enforcement disabled; no detectors ran",
                ),
                enforced: false,
            });
        }

        let violations = self.detectors.run(input, output, &settings.detectors)?;
        self.decide(violations, settings)
    }

    /// Decide the disposition of an already-detected violation set.
    pub fn decide(
        &self,
        violations: Vec<Violation>,
        settings: &AgentSettings,
    ) -> GovernanceResult<EvaluationResult> {
        for violation in &violations {
            violation.validate()?;
        }
        let threshold = settings.severity_threshold;
        if !threshold.is_finite() {
            return Err(GovernanceError::Invariant(format!(
                "severity threshold {} is not a finite number",
                threshold
            )));
        }

        let decision_severity = self.decision_severity(&violations);
        let severity = SeverityLevel::from_score(
            violations.iter().map(|v| v.severity).fold(0.0, f64::max),
        );

        // Blocked iff some confident violation reaches the threshold; an
        // empty set never blocks, even at threshold 0.
        let triggering: Vec<&Violation> = violations
            .iter()
            .filter(|v| v.meets_confidence(self.min_confidence_to_block) && v.severity >= threshold)
            .collect();

        let (status, action) = if !triggering.is_empty() {
            let categories = category_list(&triggering);
            let action = AgentAction::new(
                AgentName::PolicyEnforcer,
                ActionKind::Block,
                format!(
                    "Blocked: decision severity {:.1} >= threshold {:.1} ({})",
                    decision_severity, threshold, categories
                ),
            )
            .triggered_by(triggering);
            (InteractionStatus::Blocked, action)
        } else {
            let action = AgentAction::new(
                AgentName::PolicyEnforcer,
                ActionKind::Approve,
                format!(
                    "Approved: decision severity {:.1} below threshold {:.1}, {} violation(s) recorded",
                    decision_severity,
                    threshold,
                    violations.len()
                ),
            );
            (InteractionStatus::Approved, action)
        };

        Ok(EvaluationResult {
            violations,
            status,
            severity,
            decision_severity,
            action,
            enforced: true,
        })
    }

    /// Highest severity among violations at or above the confidence floor.
    pub fn decision_severity(&self, violations: &[Violation]) -> f64 {
        violations
            .iter()
            .filter(|v| v.meets_confidence(self.min_confidence_to_block))
            .map(|v| v.severity)
            .fold(0.0, f64::max)
    }
}

fn category_list(violations: &[&Violation]) -> String {
    let mut categories: Vec<String> = violations.iter().map(|v| v.violation_type.to_string()).collect();
    categories.sort();
    categories.dedup();
    categories.join(", ")
}
