//! HTTP request handlers.
//!
//! Pipeline runs are spawned onto their own task, so a client that
//! disconnects mid-request does not leave an interaction half-governed.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::api::types::*;
use crate::domain::{AgentSettings, GovernanceStats, Interaction, UpdateSettingsRequest};
use crate::engine::{AuditTrail, GovernedResponse, ReverifyOutcome};
use crate::error::{GovernanceError, GovernanceResult};
use crate::AppState;

// ==================== Interactions ====================

/// Answer a prompt with the LLM and govern the answer.
///
/// POST /v1/interactions
#[utoipa::path(
    post,
    path = "/v1/interactions",
    request_body = SubmitPromptRequest,
    responses(
        (status = 200, description = "Interaction governed", body = GovernedResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal error")
    ),
    tag = "interactions"
)]
pub async fn submit_prompt(
    State(state): State<AppState>,
    Json(request): Json<SubmitPromptRequest>,
) -> GovernanceResult<Json<GovernedResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(GovernanceError::BadRequest("Prompt is required".to_string()));
    }

    tracing::info!(prompt_chars = request.prompt.chars().count(), "Prompt received");

    let result = state.orchestrator.submit_detached(request.prompt).await?;
    Ok(Json(result))
}

/// Govern an existing input/output pair without calling the LLM.
///
/// POST /v1/interactions/evaluate
#[utoipa::path(
    post,
    path = "/v1/interactions/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Interaction governed", body = GovernedResponse),
        (status = 500, description = "Internal error")
    ),
    tag = "interactions"
)]
pub async fn evaluate_interaction(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> GovernanceResult<Json<GovernedResponse>> {
    let result = state
        .orchestrator
        .govern_detached(request.input, request.output)
        .await?;
    Ok(Json(result))
}

/// List recent interactions.
///
/// GET /v1/interactions
#[utoipa::path(
    get,
    path = "/v1/interactions",
    params(ListInteractionsQuery),
    responses(
        (status = 200, description = "Recent interactions", body = ListInteractionsResponse),
        (status = 500, description = "Internal error")
    ),
    tag = "interactions"
)]
pub async fn list_interactions(
    State(state): State<AppState>,
    Query(query): Query<ListInteractionsQuery>,
) -> GovernanceResult<Json<ListInteractionsResponse>> {
    let limit = query.limit.clamp(1, 100);
    let interactions = state.orchestrator.interactions(limit).await?;

    Ok(Json(ListInteractionsResponse {
        total: interactions.len(),
        interactions,
        limit,
    }))
}

/// Get one interaction with its violations and agent actions.
///
/// GET /v1/interactions/{id}
#[utoipa::path(
    get,
    path = "/v1/interactions/{id}",
    params(
        ("id" = Uuid, Path, description = "Interaction ID")
    ),
    responses(
        (status = 200, description = "Interaction", body = Interaction),
        (status = 404, description = "Interaction not found")
    ),
    tag = "interactions"
)]
pub async fn get_interaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> GovernanceResult<Json<Interaction>> {
    Ok(Json(state.orchestrator.interaction(id).await?))
}

/// Get the audit trail of an interaction and check its hash chain.
///
/// GET /v1/interactions/{id}/audit
#[utoipa::path(
    get,
    path = "/v1/interactions/{id}/audit",
    params(
        ("id" = Uuid, Path, description = "Interaction ID")
    ),
    responses(
        (status = 200, description = "Audit trail", body = AuditTrail),
        (status = 404, description = "Interaction not found")
    ),
    tag = "interactions"
)]
pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> GovernanceResult<Json<AuditTrail>> {
    Ok(Json(state.orchestrator.audit_trail(id).await?))
}

/// Attach user feedback to a decision.
///
/// POST /v1/interactions/{id}/feedback
#[utoipa::path(
    post,
    path = "/v1/interactions/{id}/feedback",
    params(
        ("id" = Uuid, Path, description = "Interaction ID")
    ),
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback recorded", body = Interaction),
        (status = 400, description = "Invalid feedback or feedback agent disabled"),
        (status = 404, description = "Interaction not found"),
        (status = 409, description = "Feedback already submitted")
    ),
    tag = "interactions"
)]
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FeedbackRequest>,
) -> GovernanceResult<Json<Interaction>> {
    let interaction = state.orchestrator.record_feedback(id, request.into()).await?;

    tracing::info!(interaction_id = %id, "Feedback recorded");

    Ok(Json(interaction))
}

/// Re-run fact verification on a stored interaction.
///
/// POST /v1/interactions/{id}/verify
#[utoipa::path(
    post,
    path = "/v1/interactions/{id}/verify",
    params(
        ("id" = Uuid, Path, description = "Interaction ID")
    ),
    responses(
        (status = 200, description = "Verification applied", body = ReverifyOutcome),
        (status = 400, description = "Verifier or policy enforcement disabled"),
        (status = 404, description = "Interaction not found"),
        (status = 409, description = "Interaction changed concurrently")
    ),
    tag = "interactions"
)]
pub async fn verify_interaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> GovernanceResult<Json<ReverifyOutcome>> {
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move { orchestrator.reverify(id).await })
        .await
        .map_err(|e| GovernanceError::Internal(format!("Verification task failed: {}", e)))??;

    Ok(Json(outcome))
}

// ==================== Settings ====================

/// Current agent settings.
///
/// GET /v1/settings
#[utoipa::path(
    get,
    path = "/v1/settings",
    responses(
        (status = 200, description = "Agent settings", body = AgentSettings)
    ),
    tag = "settings"
)]
pub async fn get_settings(State(state): State<AppState>) -> Json<AgentSettings> {
    Json(state.orchestrator.settings().await.as_ref().clone())
}

/// Update agent settings. Omitted fields keep their value.
///
/// PUT /v1/settings
#[utoipa::path(
    put,
    path = "/v1/settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = AgentSettings),
        (status = 400, description = "Invalid settings")
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> GovernanceResult<Json<AgentSettings>> {
    let settings = state.orchestrator.update_settings(&request).await?;
    Ok(Json(settings.as_ref().clone()))
}

// ==================== Stats & Health ====================

/// Dashboard statistics.
///
/// GET /v1/stats
#[utoipa::path(
    get,
    path = "/v1/stats",
    responses(
        (status = 200, description = "Governance statistics", body = GovernanceStats),
        (status = 500, description = "Internal error")
    ),
    tag = "stats"
)]
pub async fn get_stats(State(state): State<AppState>) -> GovernanceResult<Json<GovernanceStats>> {
    Ok(Json(state.orchestrator.stats().await?))
}

/// Health check endpoint.
///
/// GET /v1/health
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.orchestrator.store();
    let db_status = match store.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: store.backend().to_string(),
        database: db_status,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
