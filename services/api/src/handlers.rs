//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for scenarios
//! and agents. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rehearsal_core::RegistryError;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{Agent, CreateAgentPayload, ErrorResponse, ScenarioSummary},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ScenarioNotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::RemoteRegistration(_) => {
                error!(error = ?err, "Remote agent registration failed");
                Self::BadGateway(err.to_string())
            }
            RegistryError::Catalog(e) => Self::InternalServerError(e),
        }
    }
}

/// List all available roleplay scenarios.
#[utoipa::path(
    get,
    path = "/api/scenarios",
    responses(
        (status = 200, description = "List of scenarios", body = [ScenarioSummary]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_scenarios(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScenarioSummary>>, ApiError> {
    let scenarios = state.scenarios.list_scenarios().await?;
    Ok(Json(scenarios.iter().map(ScenarioSummary::from).collect()))
}

/// Get a single scenario by its ID.
#[utoipa::path(
    get,
    path = "/api/scenarios/{id}",
    responses(
        (status = 200, description = "Scenario details", body = ScenarioSummary),
        (status = 404, description = "Scenario not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Scenario ID")
    )
)]
pub async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScenarioSummary>, ApiError> {
    let scenario = state
        .scenarios
        .get_scenario(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scenario with id '{}' not found", id)))?;
    Ok(Json(ScenarioSummary::from(&scenario)))
}

/// Create an agent from a scenario.
#[utoipa::path(
    post,
    path = "/api/agents/create",
    request_body = CreateAgentPayload,
    responses(
        (status = 201, description = "Agent created successfully", body = Agent),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Scenario not found", body = ErrorResponse),
        (status = 502, description = "Remote agent registration failed", body = ErrorResponse)
    )
)]
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAgentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.scenario_id.trim().is_empty() {
        return Err(ApiError::BadRequest("scenario_id is required".to_string()));
    }
    let profile = state.registry.create(&payload.scenario_id).await?;
    Ok((StatusCode::CREATED, Json(Agent::from(profile.as_ref()))))
}

/// List all registered agents.
#[utoipa::path(
    get,
    path = "/api/agents",
    responses(
        (status = 200, description = "List of agents", body = [Agent])
    )
)]
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    let mut agents: Vec<Agent> = state
        .registry
        .list()
        .iter()
        .map(|profile| Agent::from(profile.as_ref()))
        .collect();
    agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(agents)
}

/// Get an agent by its ID.
#[utoipa::path(
    get,
    path = "/api/agents/{id}",
    responses(
        (status = 200, description = "Agent details", body = Agent),
        (status = 404, description = "Agent not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Agent ID")
    )
)]
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    let profile = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Agent with id '{}' not found", id)))?;
    Ok(Json(Agent::from(profile.as_ref())))
}

/// Delete an agent. Deleting an unknown agent succeeds.
#[utoipa::path(
    delete,
    path = "/api/agents/{id}",
    responses(
        (status = 204, description = "Agent deleted")
    ),
    params(
        ("id" = String, Path, description = "Agent ID")
    )
)]
pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    // Remote deregistration, if any, finishes in the background.
    let _ = state.registry.delete(&id);
    StatusCode::NO_CONTENT
}
