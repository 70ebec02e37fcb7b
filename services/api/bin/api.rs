//! Main Entrypoint for the Rehearsal API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the scenario catalog.
//! 3. Building the agent registry, optionally backed by remote agents.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown, including
//!    waiting for live relay sessions to close.

use anyhow::Context;
use rehearsal_api::{
    config::Config,
    router::create_router,
    state::{AppState, SESSION_DRAIN_TIMEOUT},
};
use rehearsal_core::{
    AgentRegistry,
    remote::{HttpRemoteAgentService, RemoteAgentService},
    scenario::{FileScenarioCatalog, ScenarioCatalog},
};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Waits for `Ctrl+C`, then cancels every live relay session.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Scenarios ---
    let scenarios: Arc<dyn ScenarioCatalog> = Arc::new(
        FileScenarioCatalog::load(&config.scenarios_path)
            .context("Failed to load scenario catalog")?,
    );

    // --- 4. Initialize the Agent Registry ---
    let remote: Option<Arc<dyn RemoteAgentService>> = match &config.remote_agents {
        Some(settings) => {
            info!(endpoint = %settings.project_endpoint, "Using remote agent service.");
            Some(Arc::new(HttpRemoteAgentService::new(
                settings.project_endpoint.clone(),
                settings.api_key.clone(),
            )))
        }
        None => {
            info!("Using local agents.");
            None
        }
    };
    let registry = Arc::new(AgentRegistry::new(scenarios.clone(), remote));

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        registry,
        scenarios,
        config: Arc::new(config.clone()),
        shutdown: shutdown.clone(),
        sessions: TaskTracker::new(),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.voice_live.default_model,
        upstream_managed = config.remote_agents.is_some(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    // Upgraded sockets outlive the HTTP connections axum tracks; wait for
    // them here so each session finishes closing before the runtime stops.
    app_state.drain_sessions(SESSION_DRAIN_TIMEOUT).await;
    info!("Server has shut down.");
    Ok(())
}
