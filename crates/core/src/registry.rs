//! Agent Registry
//!
//! Process-lifetime map from agent id to [`AgentProfile`]. It is the only
//! state shared between relay sessions. Profiles are fully built before
//! insertion and handed out as `Arc`s, so readers never see a partially
//! constructed entry.

use crate::{
    agent::{AgentProfile, generate_agent_id},
    remote::{RemoteAgentService, RemoteAgentSpec},
    scenario::ScenarioCatalog,
};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),
    #[error("Scenario catalog error: {0}")]
    Catalog(#[source] anyhow::Error),
    #[error("Remote agent registration failed: {0}")]
    RemoteRegistration(#[source] anyhow::Error),
}

pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentProfile>>>,
    catalog: Arc<dyn ScenarioCatalog>,
    remote: Option<Arc<dyn RemoteAgentService>>,
}

impl AgentRegistry {
    /// Creates an empty registry. When `remote` is set, every agent created
    /// is registered with the provider and marked upstream-managed.
    pub fn new(
        catalog: Arc<dyn ScenarioCatalog>,
        remote: Option<Arc<dyn RemoteAgentService>>,
    ) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            catalog,
            remote,
        }
    }

    /// Creates an agent from a scenario and stores it.
    ///
    /// For upstream-managed agents the remote registration happens before
    /// the entry is stored; if it fails, nothing is stored.
    #[instrument(skip(self))]
    pub async fn create(&self, scenario_id: &str) -> Result<Arc<AgentProfile>, RegistryError> {
        let scenario = self
            .catalog
            .get_scenario(scenario_id)
            .await
            .map_err(RegistryError::Catalog)?
            .ok_or_else(|| RegistryError::ScenarioNotFound(scenario_id.to_string()))?;

        let mut profile = AgentProfile::from_scenario(&scenario, self.remote.is_some());

        if let Some(remote) = &self.remote {
            let spec = RemoteAgentSpec {
                name: profile.id.clone(),
                model: profile.model.clone(),
                instructions: profile.instructions.clone(),
                temperature: profile.temperature,
            };
            let remote_id = remote
                .register(&spec)
                .await
                .map_err(RegistryError::RemoteRegistration)?;
            profile = profile.with_remote_id(remote_id);
        }

        let profile = self.insert_unique(profile);
        info!(
            agent_id = %profile.id,
            upstream_managed = profile.upstream_managed,
            "Agent created"
        );
        Ok(profile)
    }

    /// Stores a profile under an id no live agent holds. On a collision the
    /// id is regenerated; an existing entry is never replaced.
    fn insert_unique(&self, mut profile: AgentProfile) -> Arc<AgentProfile> {
        let mut agents = self.agents.write();
        loop {
            match agents.entry(profile.id.clone()) {
                Entry::Occupied(_) => {
                    warn!(agent_id = %profile.id, "Agent id collision; regenerating");
                    profile.id =
                        generate_agent_id(&profile.scenario_id, profile.upstream_managed);
                }
                Entry::Vacant(slot) => return slot.insert(Arc::new(profile)).clone(),
            }
        }
    }

    /// Looks up an agent. Unknown ids are a normal outcome, not an error.
    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentProfile>> {
        self.agents.read().get(agent_id).cloned()
    }

    /// Snapshot of all registered agents.
    pub fn list(&self) -> Vec<Arc<AgentProfile>> {
        self.agents.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Removes an agent. Deleting an unknown id is a no-op.
    ///
    /// The local entry is always removed immediately. For upstream-managed
    /// agents a detached task deregisters the agent remotely; its failure is
    /// logged and never reported to the caller. The task's handle is returned
    /// so callers may await completion, but need not.
    #[instrument(skip(self))]
    pub fn delete(&self, agent_id: &str) -> Option<JoinHandle<()>> {
        let removed = self.agents.write().remove(agent_id)?;
        info!(%agent_id, "Agent removed from registry");

        let remote = self.remote.clone()?;
        let remote_id = removed.remote_agent_id.clone()?;
        let agent_id = agent_id.to_string();
        Some(tokio::spawn(async move {
            if let Err(e) = remote.deregister(&remote_id).await {
                warn!(%agent_id, %remote_id, error = ?e, "Remote agent deregistration failed");
            }
        }))
    }
}
