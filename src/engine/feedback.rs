//! Feedback Agent - advisory human feedback, outside the approval loop.

use crate::domain::{ActionKind, AgentAction, AgentName, Interaction, UserFeedback};
use crate::error::{GovernanceError, GovernanceResult};

/// Ratings at or below this flag the decision for review.
pub const REVIEW_RATING: u8 = 2;

/// Validates feedback and turns it into an audit action.
#[derive(Debug, Default, Clone)]
pub struct FeedbackAgent;

impl FeedbackAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, feedback: &UserFeedback) -> GovernanceResult<()> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(GovernanceError::BadRequest(format!(
                "rating must be between 1 and 5, got {}",
                feedback.rating
            )));
        }
        if feedback.comment.as_ref().is_some_and(|c| c.chars().count() > 2_000) {
            return Err(GovernanceError::BadRequest(
                "comment must be at most 2000 characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Audit action for feedback on `interaction`. Never changes its status.
    pub fn review(&self, interaction: &Interaction, feedback: &UserFeedback) -> AgentAction {
        if feedback.rating <= REVIEW_RATING {
            AgentAction::new(
                AgentName::FeedbackAgent,
                ActionKind::Suggest,
                format!(
                    "Rating {}/5 disputes the {} decision; flagged for policy review",
                    feedback.rating, interaction.status
                ),
            )
            .triggered_by(&interaction.violations)
        } else {
            AgentAction::new(
                AgentName::FeedbackAgent,
                ActionKind::Log,
                format!(
                    "Rating {}/5 recorded for the {} decision",
                    feedback.rating, interaction.status
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn feedback(rating: u8) -> UserFeedback {
        UserFeedback {
            rating,
            comment: None,
            submitted_by: None,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_rating_bounds() {
        let agent = FeedbackAgent::new();
        assert!(agent.validate(&feedback(0)).is_err());
        assert!(agent.validate(&feedback(1)).is_ok());
        assert!(agent.validate(&feedback(5)).is_ok());
        assert!(agent.validate(&feedback(6)).is_err());
    }

    #[test]
    fn test_low_rating_suggests_review() {
        let agent = FeedbackAgent::new();
        let interaction = Interaction::new("q", "a");

        assert_eq!(agent.review(&interaction, &feedback(1)).action, ActionKind::Suggest);
        assert_eq!(agent.review(&interaction, &feedback(4)).action, ActionKind::Log);
    }
}
