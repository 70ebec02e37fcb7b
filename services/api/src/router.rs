//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the relay WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{Agent, CreateAgentPayload, ErrorResponse, ScenarioSummary},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_scenarios,
        handlers::get_scenario,
        handlers::create_agent,
        handlers::list_agents,
        handlers::get_agent,
        handlers::delete_agent,
    ),
    components(
        schemas(Agent, ScenarioSummary, CreateAgentPayload, ErrorResponse)
    ),
    tags(
        (name = "Rehearsal API", description = "Scenario catalog and agent management for the voice roleplay relay")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/scenarios", get(handlers::list_scenarios))
        .route("/api/scenarios/{id}", get(handlers::get_scenario))
        .route("/api/agents", get(handlers::list_agents))
        .route("/api/agents/create", post(handlers::create_agent))
        .route(
            "/api/agents/{id}",
            get(handlers::get_agent).delete(handlers::delete_agent),
        )
        .route("/ws/voice", get(ws_handler))
        .with_state(app_state);

    // Swagger UI is stateless; merge it after the state has been applied.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
