mod config;
mod eligibility;
mod errors;
mod fetcher;
mod provider;
mod rate_limit;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::eligibility::orchestrator::{EligibilityOrchestrator, OrchestratorSettings};
use crate::fetcher::FileFetcher;
use crate::provider::OpenAiClient;
use crate::rate_limit::build_rate_limiter;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Grant Eligibility API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize rate limiter (redis / memory / disabled, chosen by config)
    let rate_limiter = build_rate_limiter(&config)?;

    // Initialize file fetcher
    let fetcher = FileFetcher::new(config.scratch_dir.clone());
    info!("Scratch directory: {}", fetcher.scratch_dir().display());

    // Initialize provider client
    let provider = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
    ));
    info!(
        "Provider client initialized (base: {}, model: {})",
        config.openai_base_url, config.openai_model
    );

    let settings = OrchestratorSettings::from_config(&config);
    info!(
        "Run polling every {:?}, budget {:?}",
        settings.poll_interval, settings.run_timeout
    );

    // Build app state
    let state = AppState {
        orchestrator: Arc::new(EligibilityOrchestrator::new(
            rate_limiter,
            fetcher,
            provider,
            settings,
        )),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict CORS to the form's origin once it is deployed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
