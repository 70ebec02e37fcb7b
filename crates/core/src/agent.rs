//! Agent Profiles
//!
//! An agent profile is one conversational persona derived from a scenario.
//! It carries everything the relay needs to parameterize an upstream voice
//! session, and is immutable once built.

use crate::scenario::Scenario;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Id prefix of agents whose instructions are sent inline with each session.
pub const LOCAL_AGENT_PREFIX: &str = "local-agent";
/// Id prefix of agents registered with the remote provider.
pub const REMOTE_AGENT_PREFIX: &str = "remote-agent";

/// Behavioral prologue placed ahead of every scenario's own system prompt.
const PERSONA_PROLOGUE: &str = "You are playing a character in a spoken roleplay used for \
professional training. Behave like a real person in this situation: react naturally, \
show realistic emotions and objections, and let the trainee earn your agreement. \
Keep every answer short and conversational, one to three sentences, as if speaking on a call. \
Stay in character at all times. Never mention that you are an AI, a simulation, or a training tool.";

/// A configured conversational persona.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentProfile {
    pub id: String,
    pub scenario_id: String,
    /// True when the remote provider owns this agent's instructions.
    pub upstream_managed: bool,
    /// Provider-assigned id; only set for upstream-managed agents.
    pub remote_agent_id: Option<String>,
    pub instructions: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub created_at: DateTime<Utc>,
}

impl AgentProfile {
    /// Builds a profile from a scenario. The remote id, if any, is attached
    /// with [`AgentProfile::with_remote_id`] once registration succeeded.
    pub fn from_scenario(scenario: &Scenario, upstream_managed: bool) -> Self {
        Self {
            id: generate_agent_id(&scenario.id, upstream_managed),
            scenario_id: scenario.id.clone(),
            upstream_managed,
            remote_agent_id: None,
            instructions: build_instructions(scenario),
            model: scenario.model.clone(),
            temperature: scenario.model_parameters.temperature,
            max_tokens: scenario.model_parameters.max_tokens,
            created_at: Utc::now(),
        }
    }

    pub fn with_remote_id(mut self, remote_id: String) -> Self {
        self.remote_agent_id = Some(remote_id);
        self
    }

    /// The id the provider knows this agent by.
    pub fn upstream_id(&self) -> &str {
        self.remote_agent_id.as_deref().unwrap_or(&self.id)
    }
}

/// Synthesizes a fresh agent id whose prefix tells local and remote agents apart.
pub fn generate_agent_id(scenario_id: &str, upstream_managed: bool) -> String {
    let prefix = if upstream_managed {
        REMOTE_AGENT_PREFIX
    } else {
        LOCAL_AGENT_PREFIX
    };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, scenario_id, &suffix[..8])
}

/// Concatenates the persona prologue with the scenario's system messages.
pub fn build_instructions(scenario: &Scenario) -> String {
    let mut parts = vec![PERSONA_PROLOGUE];
    parts.extend(scenario.system_messages().filter(|m| !m.trim().is_empty()));
    parts.join("\n\n")
}
