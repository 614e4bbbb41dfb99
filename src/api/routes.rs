//! Route definitions for the API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers;
use crate::AppState;

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::submit_prompt,
        handlers::evaluate_interaction,
        handlers::list_interactions,
        handlers::get_interaction,
        handlers::get_audit_trail,
        handlers::submit_feedback,
        handlers::verify_interaction,
        handlers::get_settings,
        handlers::update_settings,
        handlers::get_stats,
        handlers::health_check,
    ),
    components(schemas(
        crate::api::types::SubmitPromptRequest,
        crate::api::types::EvaluateRequest,
        crate::api::types::ListInteractionsResponse,
        crate::api::types::FeedbackRequest,
        crate::api::types::HealthResponse,
        crate::engine::GovernedResponse,
        crate::engine::ReverifyOutcome,
        crate::engine::AuditTrail,
        crate::engine::Verification,
        crate::engine::VerificationState,
        crate::domain::Interaction,
        crate::domain::InteractionStatus,
        crate::domain::LlmProvenance,
        crate::domain::UserFeedback,
        crate::domain::Violation,
        crate::domain::ViolationType,
        crate::domain::SeverityLevel,
        crate::domain::TextSource,
        crate::domain::AgentAction,
        crate::domain::AgentName,
        crate::domain::ActionKind,
        crate::domain::AuditEntry,
        crate::domain::TrailVerification,
        crate::domain::AgentSettings,
        crate::domain::DetectorToggles,
        crate::domain::UpdateSettingsRequest,
        crate::domain::GovernanceStats,
    )),
    tags(
        (name = "interactions", description = "Governed interactions, audit trails and feedback"),
        (name = "settings", description = "Agent settings"),
        (name = "stats", description = "Dashboard statistics"),
        (name = "health", description = "Health and status endpoints")
    ),
    info(
        title = "Governance Core API",
        version = "0.1.0",
        description = "Multi-agent AI governance - evaluates LLM interactions against policy before they reach users",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Interactions
        .route(
            "/v1/interactions",
            post(handlers::submit_prompt).get(handlers::list_interactions),
        )
        .route("/v1/interactions/evaluate", post(handlers::evaluate_interaction))
        .route("/v1/interactions/:id", get(handlers::get_interaction))
        .route("/v1/interactions/:id/audit", get(handlers::get_audit_trail))
        .route("/v1/interactions/:id/feedback", post(handlers::submit_feedback))
        .route("/v1/interactions/:id/verify", post(handlers::verify_interaction))
        // Settings
        .route(
            "/v1/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        // Stats & health
        .route("/v1/stats", get(handlers::get_stats))
        .route("/v1/health", get(handlers::health_check))
        .with_state(state)
        // OpenAPI docs
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
