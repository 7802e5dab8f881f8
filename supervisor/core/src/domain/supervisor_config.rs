// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Supervisor Configuration
//
// Defines how the supervisor process itself is wired:
// - Which container runtime adapter to use (Engine API or docker CLI)
// - Where the agent configuration is persisted (local file or remote service)
// - Reconciliation timings (poll interval, retry budgets)
// - Logging and metrics settings
//
// This is distinct from AgentConfiguration, which is the desired state of the
// managed agent and lives in the config store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "AGENT_SUPERVISOR_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Container runtime adapter settings
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Agent configuration persistence
    #[serde(default)]
    pub config_store: ConfigStoreSettings,

    /// Reconciliation loop timings
    #[serde(default)]
    pub reconciliation: ReconciliationSettings,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeBackend {
    /// Docker Engine API over the local socket
    DockerApi,
    /// Shell out to the docker binary
    DockerCli,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_backend")]
    pub backend: RuntimeBackend,

    /// Path to Docker socket (DockerApi only)
    /// Default: auto-detect from DOCKER_HOST or the platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    /// Docker binary (DockerCli only)
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            docker_socket_path: None,
            docker_binary: default_docker_binary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigStoreSettings {
    /// JSON file on local disk
    File {
        #[serde(default = "default_config_file")]
        path: PathBuf,
    },
    /// Remote service exposing GET/POST/DELETE {base_url}/agents/config
    Http {
        base_url: String,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for ConfigStoreSettings {
    fn default() -> Self {
        ConfigStoreSettings::File {
            path: default_config_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSettings {
    /// Status poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Outer retry: whole "ensure running" attempts before Failed
    #[serde(default = "default_launch_attempts")]
    pub launch_attempts: u32,

    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    /// Inner retry: discovery polls after issuing the run command
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,

    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            launch_attempts: default_launch_attempts(),
            launch_delay_ms: default_launch_delay_ms(),
            confirm_attempts: default_confirm_attempts(),
            confirm_delay_ms: default_confirm_delay_ms(),
        }
    }
}

impl ReconciliationSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Prometheus listener port; metrics are not exported when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

fn default_backend() -> RuntimeBackend {
    RuntimeBackend::DockerApi
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_config_file() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".agent-supervisor").join("agent.json"))
        .unwrap_or_else(|| PathBuf::from("./agent.json"))
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_launch_attempts() -> u32 {
    3
}

fn default_launch_delay_ms() -> u64 {
    1000
}

fn default_confirm_attempts() -> u32 {
    3
}

fn default_confirm_delay_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

impl SupervisorConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Candidate locations in precedence order (after an explicit --config)
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./agent-supervisor.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".agent-supervisor").join("config.yaml"));
        }
        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/agent-supervisor/config.yaml"));
        paths
    }

    /// Discover configuration file using precedence order
    /// 1. AGENT_SUPERVISOR_CONFIG_PATH environment variable
    /// 2. ./agent-supervisor.yaml (working directory)
    /// 3. ~/.agent-supervisor/config.yaml (user home)
    /// 4. /etc/agent-supervisor/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AGENT_SUPERVISOR_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: AGENT_SUPERVISOR_POLL_INTERVAL_MS={}", ms);
                    self.reconciliation.poll_interval_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AGENT_SUPERVISOR_POLL_INTERVAL_MS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("AGENT_SUPERVISOR_RUNTIME") {
            match val.to_lowercase().as_str() {
                "docker-api" | "api" => self.runtime.backend = RuntimeBackend::DockerApi,
                "docker-cli" | "cli" => self.runtime.backend = RuntimeBackend::DockerCli,
                _ => tracing::warn!(
                    "Invalid value for AGENT_SUPERVISOR_RUNTIME: '{}'. Expected docker-api/docker-cli. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(url) = std::env::var("AGENT_SUPERVISOR_CONFIG_STORE_URL") {
            tracing::info!("Environment override: AGENT_SUPERVISOR_CONFIG_STORE_URL={}", url);
            let timeout_ms = match &self.config_store {
                ConfigStoreSettings::Http { timeout_ms, .. } => *timeout_ms,
                ConfigStoreSettings::File { .. } => default_http_timeout_ms(),
            };
            self.config_store = ConfigStoreSettings::Http { base_url: url, timeout_ms };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let r = &self.reconciliation;
        if r.poll_interval_ms == 0 {
            anyhow::bail!("reconciliation.poll_interval_ms must be greater than 0");
        }
        if r.launch_attempts == 0 {
            anyhow::bail!("reconciliation.launch_attempts must be at least 1");
        }
        if r.confirm_attempts == 0 {
            anyhow::bail!("reconciliation.confirm_attempts must be at least 1");
        }

        match &self.config_store {
            ConfigStoreSettings::Http { base_url, .. } => {
                if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                    anyhow::bail!(
                        "config_store.base_url must start with http:// or https://, got '{}'",
                        base_url
                    );
                }
            }
            ConfigStoreSettings::File { path } => {
                if path.as_os_str().is_empty() {
                    anyhow::bail!("config_store.path cannot be empty");
                }
            }
        }

        if self.runtime.backend == RuntimeBackend::DockerCli && self.runtime.docker_binary.trim().is_empty() {
            anyhow::bail!("runtime.docker_binary cannot be empty");
        }

        Ok(())
    }
}
