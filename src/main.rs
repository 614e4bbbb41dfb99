//! Governance Core - multi-agent AI governance service.
//!
//! This service answers prompts with an LLM and governs every
//! prompt/response pair before it reaches the user.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePool;
use tokio::net::TcpListener;

use governance_core::api::build_router;
use governance_core::config::Config;
use governance_core::engine::{
    GovernanceOrchestrator, HttpFactChecker, OpenRouterProvider, SharedSettings,
};
use governance_core::storage::{GovernanceRepository, InteractionStore, MemoryStore};
use governance_core::{logging, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        // Missing .env is expected in production
        eprintln!("Note: No .env file loaded ({e})");
    }

    logging::init();

    tracing::info!("Starting Governance Core v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        database = config.database.url().unwrap_or("memory"),
        llm_enabled = config.llm.enabled,
        fact_check_enabled = config.fact_check.enabled,
        "Configuration loaded"
    );

    let store: Arc<dyn InteractionStore> = match config.database.url() {
        Some(url) => {
            let pool = SqlitePool::connect(url).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to database");
                anyhow::anyhow!("Database connection error: {}", e)
            })?;

            let repository = GovernanceRepository::new(pool);
            repository.init_schema().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to initialize database schema");
                anyhow::anyhow!("Schema initialization error: {}", e)
            })?;

            tracing::info!("Database connected and schema initialized");
            Arc::new(repository)
        }
        None => {
            tracing::warn!("No database configured - using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let settings = SharedSettings::load(store.as_ref(), config.agents.clone()).await?;

    let mut orchestrator =
        GovernanceOrchestrator::new(store.clone(), settings, config.governance.clone())?;

    if config.llm.enabled && !config.llm.api_key.is_empty() {
        tracing::info!(model = %config.llm.model, "LLM provider enabled");
        let provider = OpenRouterProvider::new(
            config.llm.clone(),
            Duration::from_millis(config.governance.llm_timeout_ms),
        )?;
        orchestrator = orchestrator.with_llm(Arc::new(provider));
    } else {
        tracing::warn!("LLM provider disabled - prompts will be answered with fallback text");
    }

    if config.fact_check.enabled && !config.fact_check.endpoint.is_empty() {
        tracing::info!(endpoint = %config.fact_check.endpoint, "Fact-check provider enabled");
        let checker = HttpFactChecker::new(
            &config.fact_check,
            Duration::from_millis(config.governance.verifier_timeout_ms),
        )?;
        orchestrator = orchestrator.with_fact_checker(Arc::new(checker));
    } else {
        tracing::info!("Fact-check provider disabled - verification fails open");
    }

    let state = AppState::new(Arc::new(orchestrator));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Server listening");
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
