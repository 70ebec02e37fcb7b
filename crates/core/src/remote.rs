//! Remote Agent Service
//!
//! Upstream-managed agents live on the voice provider's side: their
//! instructions and model are registered once through the provider's agent
//! API, and the relay only refers to them by id afterwards.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const AGENTS_API_VERSION: &str = "v1";

/// Everything the provider needs to register an agent on its side.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RemoteAgentSpec {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub temperature: f32,
}

/// Registers and deregisters agents with the remote provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteAgentService: Send + Sync {
    /// Registers an agent and returns the provider-assigned id.
    async fn register(&self, spec: &RemoteAgentSpec) -> Result<String>;

    /// Removes a previously registered agent.
    async fn deregister(&self, remote_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct CreatedAgent {
    id: String,
}

/// A `RemoteAgentService` speaking the provider's HTTP agents API.
pub struct HttpRemoteAgentService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpRemoteAgentService {
    /// Creates a client for the agents API rooted at `endpoint`
    /// (e.g. `https://my-project.services.ai.azure.com/api/projects/demo`).
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn assistants_url(&self, suffix: Option<&str>) -> String {
        match suffix {
            Some(id) => format!(
                "{}/assistants/{}?api-version={}",
                self.endpoint,
                urlencoding::encode(id),
                AGENTS_API_VERSION
            ),
            None => format!("{}/assistants?api-version={}", self.endpoint, AGENTS_API_VERSION),
        }
    }
}

#[async_trait]
impl RemoteAgentService for HttpRemoteAgentService {
    async fn register(&self, spec: &RemoteAgentSpec) -> Result<String> {
        debug!(name = %spec.name, model = %spec.model, "Registering remote agent");
        let response = self
            .client
            .post(self.assistants_url(None))
            .header("api-key", &self.api_key)
            .json(spec)
            .send()
            .await
            .context("Failed to reach the agents API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Agent registration failed with {}: {}", status, body));
        }

        let created: CreatedAgent = response
            .json()
            .await
            .context("Agents API returned an unexpected body")?;
        info!(remote_id = %created.id, "Remote agent registered");
        Ok(created.id)
    }

    async fn deregister(&self, remote_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.assistants_url(Some(remote_id)))
            .header("api-key", &self.api_key)
            .send()
            .await
            .context("Failed to reach the agents API")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Agent deregistration failed with {}", status));
        }
        info!(%remote_id, "Remote agent deregistered");
        Ok(())
    }
}
