//! API request and response types.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Interaction, UserFeedback};

// ==================== Interactions ====================

/// Request to answer a prompt with the LLM and govern the answer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitPromptRequest {
    /// The end-user prompt.
    pub prompt: String,
}

/// Request to govern an existing input/output pair.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    /// The user prompt.
    #[serde(default)]
    pub input: String,
    /// The model output to govern.
    #[serde(default)]
    pub output: String,
}

/// Query parameters for listing interactions.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListInteractionsQuery {
    /// Maximum number of results (1-100).
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Response for listing interactions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListInteractionsResponse {
    /// Interactions, most recent first.
    pub interactions: Vec<Interaction>,
    /// Number returned.
    pub total: usize,
    /// Limit used.
    pub limit: i64,
}

// ==================== Feedback ====================

/// Feedback submitted on a decision.
#[derive(Debug, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    /// Rating from 1 (wrong decision) to 5 (right decision).
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

impl From<FeedbackRequest> for UserFeedback {
    fn from(request: FeedbackRequest) -> Self {
        UserFeedback {
            rating: request.rating,
            comment: request.comment,
            submitted_by: request.submitted_by,
            submitted_at: chrono::Utc::now(),
        }
    }
}

// ==================== Health ====================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Storage backend in use.
    pub storage: String,
    /// Storage connectivity.
    pub database: String,
    /// Timestamp.
    pub timestamp: String,
}
