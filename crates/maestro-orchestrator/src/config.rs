use crate::capability::{CapabilityVocabulary, DEFAULT_CAPABILITIES};
use crate::types::DEFAULT_PRIORITY;
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for an [`Orchestrator`](crate::Orchestrator).
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capability tags accepted at registration and task creation.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
    /// Maximum execution records kept; `0` keeps everything.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Abort handlers that run longer than this and mark the task timed out.
    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,
    /// Priority given to tasks created without one. Lower is more urgent.
    #[serde(default = "default_priority")]
    pub default_priority: i32,
}

fn default_capabilities() -> Vec<String> {
    DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}
fn default_history_limit() -> usize {
    1000
}
fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capabilities: default_capabilities(),
            history_limit: default_history_limit(),
            execution_timeout_ms: None,
            default_priority: default_priority(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(raw: &str) -> MaestroResult<Self> {
        toml::from_str(raw).map_err(|e| MaestroError::Config(format!("Invalid config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> MaestroResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn vocabulary(&self) -> MaestroResult<CapabilityVocabulary> {
        CapabilityVocabulary::new(self.capabilities.iter().cloned())
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_capabilities(mut self, tags: &[&str]) -> Self {
        self.capabilities = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}
