// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// coordinator process:
// - Scheduler timing and fairness limits
// - Message queue backend (in-process or Redis)
// - Capability vocabulary and the agent roster seeded at startup
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::agent::{
    Agent, AgentId, CapabilityVocabulary, DEFAULT_CAPABILITIES, DEFAULT_MAX_CONCURRENT_TASKS,
};
use crate::domain::task::Specialization;

pub const API_VERSION: &str = "xmrt.io/v1";
pub const KIND: &str = "CoordinatorConfig";
pub const CONFIG_PATH_ENV: &str = "XMRT_CONFIG_PATH";

/// Top-level coordinator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// API version (must be "xmrt.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinatorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: CoordinatorSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable coordinator name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSpec {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub message_queue: MessageQueueConfig,

    /// Capability vocabulary accepted at agent registration
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Agents registered when the coordinator starts
    #[serde(default = "default_roster")]
    pub agents: Vec<AgentRosterEntry>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between background scheduling passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// An in-progress task is reassigned once its agent has been silent this long
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold_seconds: u64,

    /// Upper bound on assignments made per priority tier on each pass
    #[serde(default = "default_assignments_per_tier")]
    pub assignments_per_tier_per_tick: usize,

    /// Capacity for roster entries that do not set their own
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks_default: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            staleness_threshold_seconds: default_staleness_threshold(),
            assignments_per_tier_per_tick: default_assignments_per_tier(),
            max_concurrent_tasks_default: default_max_concurrent_tasks(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Local,
    Redis,
}

impl Default for QueueBackend {
    fn default() -> Self {
        QueueBackend::Local
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Redis connection URL (required when backend is "redis")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    /// Prefix for per-agent Redis inbox lists
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Default blocking receive timeout in milliseconds
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,

    /// Number of sent messages kept in memory for inspection
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Local,
            redis_url: None,
            key_prefix: default_key_prefix(),
            receive_timeout_ms: default_receive_timeout(),
            history_capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRosterEntry {
    pub id: String,
    pub name: String,
    pub specialization: Specialization,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
    /// Informational only; the coordinator never dials agent endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl AgentRosterEntry {
    fn new(id: &str, name: &str, specialization: Specialization, capabilities: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            specialization,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            max_concurrent_tasks: None,
            endpoint: None,
        }
    }

    /// Build the scheduling record for this entry, checking capabilities
    /// against `vocabulary`.
    pub fn to_agent(
        &self,
        vocabulary: &CapabilityVocabulary,
        default_capacity: usize,
        now: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Agent> {
        let capabilities = vocabulary
            .resolve(&self.capabilities)
            .map_err(|e| anyhow::anyhow!("agent '{}': {}", self.id, e))?;
        Ok(Agent::new(
            AgentId::new(self.id.clone()),
            self.name.clone(),
            self.specialization,
            capabilities,
            now,
        )
        .with_max_concurrent_tasks(self.max_concurrent_tasks.unwrap_or(default_capacity)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port; metrics are not exposed when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

// Default value functions
fn default_poll_interval() -> u64 {
    30
}

fn default_staleness_threshold() -> u64 {
    3600
}

fn default_assignments_per_tier() -> usize {
    1
}

fn default_max_concurrent_tasks() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

fn default_key_prefix() -> String {
    "xmrt:inbox".to_string()
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_history_capacity() -> usize {
    1000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_capabilities() -> Vec<String> {
    DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}

/// The four XMRT DAO personas.
pub fn default_roster() -> Vec<AgentRosterEntry> {
    vec![
        AgentRosterEntry::new(
            "governor",
            "Governor",
            Specialization::Governance,
            &["governance_proposals", "voting", "treasury_management", "policy_analysis"],
        ),
        AgentRosterEntry::new(
            "defi_specialist",
            "DeFi Specialist",
            Specialization::Defi,
            &["defi_analysis", "yield_optimization", "liquidity_management", "risk_assessment"],
        ),
        AgentRosterEntry::new(
            "security_guardian",
            "Security Guardian",
            Specialization::Security,
            &["security_audit", "threat_detection", "smart_contract_review", "incident_response"],
        ),
        AgentRosterEntry::new(
            "community_manager",
            "Community Manager",
            Specialization::Community,
            &["community_engagement", "social_media", "content_creation", "moderation"],
        ),
    ]
}

impl Default for CoordinatorSpec {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            message_queue: MessageQueueConfig::default(),
            capabilities: default_capabilities(),
            agents: default_roster(),
            network: NetworkConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "xmrt-coordinator".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: CoordinatorSpec::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. XMRT_CONFIG_PATH environment variable
    /// 2. ./xmrt-config.yaml (working directory)
    /// 3. ~/.xmrt/config.yaml (user home)
    /// 4. /etc/xmrt/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./xmrt-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".xmrt").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/xmrt/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("XMRT_REDIS_URL") {
            tracing::info!("Environment override: XMRT_REDIS_URL");
            self.spec.message_queue.redis_url = Some(url);
        }

        if let Some(val) = lookup("XMRT_QUEUE_BACKEND") {
            match val.to_lowercase().as_str() {
                "local" => self.spec.message_queue.backend = QueueBackend::Local,
                "redis" => self.spec.message_queue.backend = QueueBackend::Redis,
                _ => {
                    tracing::warn!(
                        "Invalid value for XMRT_QUEUE_BACKEND: '{}'. Expected local/redis. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(val) = lookup("XMRT_POLL_INTERVAL_SECONDS") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!("Environment override: XMRT_POLL_INTERVAL_SECONDS={}", seconds);
                    self.spec.scheduler.poll_interval_seconds = seconds;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for XMRT_POLL_INTERVAL_SECONDS: '{}'. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn vocabulary(&self) -> anyhow::Result<CapabilityVocabulary> {
        CapabilityVocabulary::from_tags(&self.spec.capabilities)
            .map_err(|e| anyhow::anyhow!("Invalid capability vocabulary: {}", e))
    }

    /// Scheduling records for every roster entry.
    pub fn roster_agents(&self, now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<Agent>> {
        let vocabulary = self.vocabulary()?;
        self.spec
            .agents
            .iter()
            .map(|entry| {
                entry.to_agent(
                    &vocabulary,
                    self.spec.scheduler.max_concurrent_tasks_default,
                    now,
                )
            })
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let scheduler = &self.spec.scheduler;
        if scheduler.poll_interval_seconds == 0 {
            anyhow::bail!("spec.scheduler.poll_interval_seconds must be positive");
        }
        if scheduler.staleness_threshold_seconds == 0 {
            anyhow::bail!("spec.scheduler.staleness_threshold_seconds must be positive");
        }
        if scheduler.assignments_per_tier_per_tick == 0 {
            anyhow::bail!("spec.scheduler.assignments_per_tier_per_tick must be positive");
        }
        if scheduler.max_concurrent_tasks_default == 0 {
            anyhow::bail!("spec.scheduler.max_concurrent_tasks_default must be positive");
        }

        let queue = &self.spec.message_queue;
        if queue.backend == QueueBackend::Redis
            && queue.redis_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.message_queue.redis_url is required for the redis backend");
        }
        if queue.history_capacity == 0 {
            anyhow::bail!("spec.message_queue.history_capacity must be positive");
        }

        let vocabulary = self.vocabulary()?;
        let mut seen = HashSet::new();
        for entry in &self.spec.agents {
            if entry.id.trim().is_empty() {
                anyhow::bail!("Agent id cannot be empty");
            }
            if !seen.insert(entry.id.as_str()) {
                anyhow::bail!("Duplicate agent id in roster: {}", entry.id);
            }
            if entry.max_concurrent_tasks == Some(0) {
                anyhow::bail!("Agent '{}' must allow at least one concurrent task", entry.id);
            }
            let resolved: BTreeSet<_> = vocabulary
                .resolve(&entry.capabilities)
                .map_err(|e| anyhow::anyhow!("Agent '{}': {}", entry.id, e))?;
            if resolved.len() != entry.capabilities.len() {
                tracing::warn!("Agent '{}' lists duplicate capabilities", entry.id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = CoordinatorConfig::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.scheduler.poll_interval_seconds, 30);
        assert_eq!(manifest.spec.scheduler.staleness_threshold_seconds, 3600);
        assert_eq!(manifest.spec.agents.len(), 4);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: xmrt.io/v1
kind: CoordinatorConfig
metadata:
  name: test-coordinator
spec:
  scheduler:
    poll_interval_seconds: 5
  agents:
    - id: security_guardian
      name: Security Guardian
      specialization: security
      capabilities: [security_audit]
      max_concurrent_tasks: 2
"#;
        let config = CoordinatorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.scheduler.poll_interval_seconds, 5);
        assert_eq!(config.spec.scheduler.assignments_per_tier_per_tick, 1);
        assert_eq!(config.spec.message_queue.backend, QueueBackend::Local);
        assert_eq!(config.spec.agents.len(), 1);

        let agents = config.roster_agents(chrono::Utc::now()).unwrap();
        assert_eq!(agents[0].max_concurrent_tasks, 2);
        assert_eq!(agents[0].specialization, Specialization::Security);
    }

    #[test]
    fn test_validation() {
        let mut manifest = CoordinatorConfig::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.message_queue.backend = QueueBackend::Redis;
        assert!(manifest.validate().is_err());
        manifest.spec.message_queue.redis_url = Some("redis://127.0.0.1:6379".to_string());
        assert!(manifest.validate().is_ok());

        manifest.spec.agents.push(manifest.spec.agents[0].clone());
        assert!(manifest.validate().is_err());
        manifest.spec.agents.pop();

        manifest.spec.agents[0].capabilities.push("astrology".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CoordinatorConfig::default();
        config.apply_overrides(|key| match key {
            "XMRT_REDIS_URL" => Some("redis://cache:6379".to_string()),
            "XMRT_QUEUE_BACKEND" => Some("REDIS".to_string()),
            "XMRT_POLL_INTERVAL_SECONDS" => Some("not-a-number".to_string()),
            _ => None,
        });

        assert_eq!(config.spec.message_queue.backend, QueueBackend::Redis);
        assert_eq!(
            config.spec.message_queue.redis_url.as_deref(),
            Some("redis://cache:6379")
        );
        assert_eq!(config.spec.scheduler.poll_interval_seconds, 30);
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xmrt-config.yaml");

        let mut config = CoordinatorConfig::default();
        config.metadata.name = "file-test".to_string();
        config.to_yaml_file(&path).unwrap();

        let loaded = CoordinatorConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "file-test");
        assert_eq!(loaded.spec.agents.len(), 4);
    }
}
