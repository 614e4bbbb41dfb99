//! Response Agent - decides the text shown to the end user.

use crate::domain::{
    ActionKind, AgentAction, AgentName, InteractionStatus, SeverityLevel, Violation, ViolationType,
};

const REFUSAL: &str = "I can't help with this request because it conflicts with our content policy";

const WITHHELD: &str = "This response was withheld by policy.";

const SAFETY_NOTE: &str = "If you or someone else is in danger, please contact local emergency \
services or a crisis line in your country right away.";

/// The user-facing reply and, when one applies, the agent's audit action.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub action: Option<AgentAction>,
}

/// Produces approved output verbatim or a fixed refusal.
///
/// The refusal never contains any fragment of the input or output; it names
/// only the generic labels of the triggering categories.
#[derive(Debug, Default, Clone)]
pub struct ResponseAgent;

impl ResponseAgent {
    pub fn new() -> Self {
        Self
    }

    /// `violations` are the ones that triggered the block; labels and the
    /// safety note derive from them alone.
    pub fn respond(
        &self,
        original_output: &str,
        status: InteractionStatus,
        violations: &[Violation],
        enabled: bool,
    ) -> Reply {
        if status != InteractionStatus::Blocked {
            return Reply {
                text: original_output.to_string(),
                action: None,
            };
        }

        if !enabled {
            return Reply {
                text: WITHHELD.to_string(),
                action: None,
            };
        }

        let mut categories: Vec<ViolationType> = violations.iter().map(|v| v.violation_type).collect();
        categories.sort();
        categories.dedup();

        let mut text = if categories.is_empty() {
            format!("{}.", REFUSAL)
        } else {
            let labels: Vec<&str> = categories.iter().map(|c| c.label()).collect();
            format!("{} ({}).", REFUSAL, labels.join(", "))
        };

        let critical = violations
            .iter()
            .any(|v| SeverityLevel::from_score(v.severity) == SeverityLevel::Critical);
        if critical {
            text.push(' ');
            text.push_str(SAFETY_NOTE);
        }

        let action = AgentAction::new(
            AgentName::ResponseAgent,
            ActionKind::Suggest,
            format!(
                "Replaced output with safe refusal{}",
                if critical { " and safety resources" } else { "" }
            ),
        );

        Reply {
            text,
            action: Some(action),
        }
    }
}
