//! Scenario Catalog
//!
//! A scenario describes one roleplay exercise: the system-role messages that
//! shape the persona, plus the model parameters the persona is run with.
//! Agents are derived from scenarios, so the catalog is the starting point
//! of every training session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// A single message of a scenario's prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioMessage {
    pub role: String,
    pub content: String,
}

/// Sampling parameters applied to an agent created from a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParameters {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// A roleplay scenario as loaded from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub messages: Vec<ScenarioMessage>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub model_parameters: ModelParameters,
}

impl Scenario {
    /// Iterates over the contents of all `system`-role messages, in order.
    pub fn system_messages(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role.eq_ignore_ascii_case("system"))
            .map(|m| m.content.as_str())
    }
}

/// Defines the contract for any source of roleplay scenarios.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScenarioCatalog: Send + Sync {
    /// Looks up a scenario by id. Unknown ids yield `Ok(None)`.
    async fn get_scenario(&self, id: &str) -> Result<Option<Scenario>>;

    /// Lists every scenario in the catalog, ordered by id.
    async fn list_scenarios(&self) -> Result<Vec<Scenario>>;
}

/// An in-memory catalog, useful for tests and for embedding fixed scenarios.
#[derive(Debug, Default, Clone)]
pub struct StaticScenarioCatalog {
    scenarios: BTreeMap<String, Scenario>,
}

impl StaticScenarioCatalog {
    pub fn new(scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        Self {
            scenarios: scenarios.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

#[async_trait]
impl ScenarioCatalog for StaticScenarioCatalog {
    async fn get_scenario(&self, id: &str) -> Result<Option<Scenario>> {
        Ok(self.scenarios.get(id).cloned())
    }

    async fn list_scenarios(&self) -> Result<Vec<Scenario>> {
        Ok(self.scenarios.values().cloned().collect())
    }
}

/// A catalog loaded once from a directory of `*.json` scenario files.
///
/// Files that cannot be read or parsed are skipped with a warning so that a
/// single broken definition does not take the whole catalog down.
pub struct FileScenarioCatalog {
    inner: StaticScenarioCatalog,
}

impl FileScenarioCatalog {
    /// Loads every scenario file found directly inside `dir`.
    ///
    /// A scenario without an explicit `id` takes the file stem as its id.
    /// A missing directory produces an empty catalog.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            warn!(path = %dir.display(), "Scenario directory not found; catalog is empty.");
            return Ok(Self {
                inner: StaticScenarioCatalog::default(),
            });
        }

        let mut scenarios = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read scenario directory {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::load_file(&path) {
                Ok(scenario) => scenarios.push(scenario),
                Err(e) => warn!(path = %path.display(), error = ?e, "Skipping invalid scenario file"),
            }
        }

        info!(count = scenarios.len(), path = %dir.display(), "Scenario catalog loaded");
        Ok(Self {
            inner: StaticScenarioCatalog::new(scenarios),
        })
    }

    fn load_file(path: &Path) -> Result<Scenario> {
        let raw = std::fs::read_to_string(path)?;
        let mut scenario: Scenario = serde_json::from_str(&raw)?;
        if scenario.id.is_empty() {
            scenario.id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
        }
        Ok(scenario)
    }
}

#[async_trait]
impl ScenarioCatalog for FileScenarioCatalog {
    async fn get_scenario(&self, id: &str) -> Result<Option<Scenario>> {
        self.inner.get_scenario(id).await
    }

    async fn list_scenarios(&self) -> Result<Vec<Scenario>> {
        self.inner.list_scenarios().await
    }
}
