//! Runtime configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `NOESIS_*` environment overrides for the knobs operators actually turn
//! in deployment.

use crate::error::{NoesisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Agent namespace used in store keys
    pub agent_id: String,

    /// Domains the reasoning loops scan
    pub domains: Vec<String>,

    /// Store connection string (informational for the in-memory store)
    pub store_url: String,

    /// Bus connection string (informational for the in-memory bus)
    pub bus_url: String,

    /// Goal Manager HTTP bind address
    pub goal_http_addr: String,

    /// Intelligent Executor HTTP bind address
    pub executor_http_addr: String,

    /// Cross-fingerprint concurrency cap in the executor
    pub concurrency_cap: usize,

    /// Workflow wall-clock budget T_wf, seconds
    pub workflow_budget_secs: u64,

    /// Sandbox execution budget T_exec, seconds
    pub exec_budget_secs: u64,

    /// Validation retry cap N_retry
    pub retry_cap: u32,

    /// Epistemic threshold Θ for goal synthesis
    pub uncertainty_threshold: f64,

    /// Synthesiser batch cap per cycle
    pub synthesiser_batch_cap: usize,

    /// Monitor Converter period P, seconds
    pub converter_period_secs: u64,

    /// Coherence scan period S, seconds
    pub coherence_period_secs: u64,

    /// Coherence startup delay D, seconds
    pub coherence_startup_delay_secs: u64,

    /// Duplicate-suppression window W, seconds
    pub duplicate_window_secs: u64,

    /// Synthesiser cooling period T, seconds
    pub cooling_period_secs: u64,

    /// LLM gateway settings
    pub llm: LlmConfig,

    /// Sandbox interpreter per language
    pub sandbox_images: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut sandbox_images = BTreeMap::new();
        sandbox_images.insert("python".to_string(), "python3".to_string());
        sandbox_images.insert("bash".to_string(), "bash".to_string());
        sandbox_images.insert("node".to_string(), "node".to_string());

        Self {
            agent_id: "agent_1".to_string(),
            domains: vec!["general".to_string()],
            store_url: "memory://".to_string(),
            bus_url: "memory://".to_string(),
            goal_http_addr: "127.0.0.1:8090".to_string(),
            executor_http_addr: "127.0.0.1:8091".to_string(),
            concurrency_cap: 4,
            workflow_budget_secs: 600,
            exec_budget_secs: 30,
            retry_cap: 3,
            uncertainty_threshold: 0.4,
            synthesiser_batch_cap: 8,
            converter_period_secs: 30,
            coherence_period_secs: 300,
            coherence_startup_delay_secs: 10,
            duplicate_window_secs: 600,
            cooling_period_secs: 600,
            llm: LlmConfig::default(),
            sandbox_images,
        }
    }
}

/// LLM gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/v1".to_string(),
            model: "default".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl RuntimeConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)
                    .map_err(|e| NoesisError::Config(format!("{}: {}", path, e)))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `NOESIS_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("NOESIS_AGENT_ID") {
            self.agent_id = v;
        }
        if let Ok(v) = std::env::var("NOESIS_STORE_URL") {
            self.store_url = v;
        }
        if let Ok(v) = std::env::var("NOESIS_BUS_URL") {
            self.bus_url = v;
        }
        if let Ok(v) = std::env::var("NOESIS_GOAL_HTTP_ADDR") {
            self.goal_http_addr = v;
        }
        if let Ok(v) = std::env::var("NOESIS_EXECUTOR_HTTP_ADDR") {
            self.executor_http_addr = v;
        }
        if let Ok(v) = std::env::var("NOESIS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("NOESIS_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = env_parse("NOESIS_RETRY_CAP") {
            self.retry_cap = v;
        }
        if let Some(v) = env_parse("NOESIS_CONCURRENCY_CAP") {
            self.concurrency_cap = v;
        }
        if let Some(v) = env_parse("NOESIS_EXEC_BUDGET_SECS") {
            self.exec_budget_secs = v;
        }
        if let Some(v) = env_parse("NOESIS_WORKFLOW_BUDGET_SECS") {
            self.workflow_budget_secs = v;
        }
        if let Some(v) = env_parse("NOESIS_DUPLICATE_WINDOW_SECS") {
            self.duplicate_window_secs = v;
        }
    }

    pub fn workflow_budget(&self) -> Duration {
        Duration::from_secs(self.workflow_budget_secs)
    }

    pub fn exec_budget(&self) -> Duration {
        Duration::from_secs(self.exec_budget_secs)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_secs)
    }

    pub fn cooling_period(&self) -> Duration {
        Duration::from_secs(self.cooling_period_secs)
    }

    pub fn converter_period(&self) -> Duration {
        Duration::from_secs(self.converter_period_secs)
    }

    pub fn coherence_period(&self) -> Duration {
        Duration::from_secs(self.coherence_period_secs)
    }

    pub fn coherence_startup_delay(&self) -> Duration {
        Duration::from_secs(self.coherence_startup_delay_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry_cap, 3);
        assert_eq!(config.exec_budget(), Duration::from_secs(30));
        assert_eq!(config.workflow_budget(), Duration::from_secs(600));
        assert_eq!(config.duplicate_window(), Duration::from_secs(600));
        assert_eq!(config.uncertainty_threshold, 0.4);
        assert_eq!(config.converter_period(), Duration::from_secs(30));
        assert_eq!(config.coherence_period(), Duration::from_secs(300));
        assert_eq!(config.coherence_startup_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let config: RuntimeConfig =
            toml::from_str("agent_id = \"agent_9\"\nretry_cap = 1\n").unwrap();
        assert_eq!(config.agent_id, "agent_9");
        assert_eq!(config.retry_cap, 1);
        // Untouched knobs keep their defaults.
        assert_eq!(config.exec_budget_secs, 30);
    }
}
