//! API Models
//!
//! Request and response bodies of the REST surface, annotated for OpenAPI
//! generation with `utoipa`.

use chrono::{DateTime, Utc};
use rehearsal_core::{AgentProfile, scenario::Scenario};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateAgentPayload {
    #[schema(example = "pharmacy-objection")]
    pub scenario_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Agent {
    #[schema(example = "local-agent-pharmacy-objection-1a2b3c4d")]
    pub agent_id: String,
    pub scenario_id: String,
    pub upstream_managed: bool,
    pub remote_agent_id: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&AgentProfile> for Agent {
    fn from(profile: &AgentProfile) -> Self {
        Self {
            agent_id: profile.id.clone(),
            scenario_id: profile.scenario_id.clone(),
            upstream_managed: profile.upstream_managed,
            remote_agent_id: profile.remote_agent_id.clone(),
            model: profile.model.clone(),
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
            created_at: profile.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    #[schema(example = "pharmacy-objection")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub model: String,
}

impl From<&Scenario> for ScenarioSummary {
    fn from(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            model: scenario.model.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
