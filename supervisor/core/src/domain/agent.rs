// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Configuration Domain
//!
//! Desired state for the managed agent: credentials, target project and an
//! optional traffic scope. Also defines the reserved identifiers that form the
//! ownership protocol with the container runtime. The same three constants are
//! written by the launcher and matched by the locator, so they must never drift.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent configuration value object and reserved identifiers

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Fixed container name given to the agent on every launch.
pub const AGENT_CONTAINER_NAME: &str = "akita-docker-extension-agent";

/// Image the agent runs from.
pub const AGENT_IMAGE: &str = "akitasoftware/cli:latest";

/// Label key marking a container as owned by this supervisor.
pub const OWNERSHIP_LABEL_KEY: &str = "com.docker.desktop.extension";

/// Label value paired with [`OWNERSHIP_LABEL_KEY`].
pub const OWNERSHIP_LABEL_VALUE: &str = "true";

/// Environment variable carrying the API key id into the agent container.
pub const API_KEY_ENV: &str = "AKITA_API_KEY_ID";

/// Environment variable carrying the API key secret into the agent container.
pub const API_SECRET_ENV: &str = "AKITA_API_KEY_SECRET";

/// Errors raised while validating an [`AgentConfiguration`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("api key is missing")]
    MissingApiKey,

    #[error("api secret is missing")]
    MissingApiSecret,

    #[error("project name is missing")]
    MissingProject,

    #[error("target port {0} is out of range (1-65535)")]
    PortOutOfRange(u64),

    #[error("invalid agent configuration: {0}")]
    Malformed(String),
}

/// Desired state of the agent.
///
/// Replaced wholesale on every settings change; never patched in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    pub api_key: String,
    pub api_secret: String,
    pub project_name: String,

    /// Capture only traffic on this port. Ignored when `target_container` is set.
    #[serde(default, deserialize_with = "deserialize_port", skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,

    /// Join this container's network namespace instead of the host's.
    #[serde(default, deserialize_with = "deserialize_container", skip_serializing_if = "Option::is_none")]
    pub target_container: Option<String>,

    /// Whether the agent should be running at all.
    #[serde(default)]
    pub enabled: bool,
}

impl AgentConfiguration {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            project_name: project_name.into(),
            target_port: None,
            target_container: None,
            enabled: true,
        }
    }

    pub fn with_target_port(mut self, port: u16) -> Self {
        self.target_port = if port == 0 { None } else { Some(port) };
        self
    }

    pub fn with_target_container(mut self, container: impl Into<String>) -> Self {
        let container = container.into();
        self.target_container = if container.trim().is_empty() { None } else { Some(container) };
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Decode and validate a JSON payload.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigurationError::MissingApiKey);
        }
        if self.api_secret.trim().is_empty() {
            return Err(ConfigurationError::MissingApiSecret);
        }
        if self.project_name.trim().is_empty() {
            return Err(ConfigurationError::MissingProject);
        }
        if self.target_port == Some(0) {
            return Err(ConfigurationError::PortOutOfRange(0));
        }
        Ok(())
    }

    /// True when the agent should be launched: enabled and valid.
    pub fn wants_agent(&self) -> bool {
        self.enabled && self.validate().is_ok()
    }

    /// False when neither a port nor a container scopes the capture, meaning
    /// the agent sees all host traffic.
    pub fn has_traffic_filter(&self) -> bool {
        self.target_port.is_some() || self.target_container.is_some()
    }
}

impl fmt::Debug for AgentConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfiguration")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("project_name", &self.project_name)
            .field("target_port", &self.target_port)
            .field("target_container", &self.target_container)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u64),
    Text(String),
    Signed(i64),
    Float(f64),
}

/// Ports arrive from forms as numbers or strings. Zero, empty and
/// non-numeric values all mean "no port filter".
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawPort> = Option::deserialize(deserializer)?;
    let value = match raw {
        None => return Ok(None),
        Some(RawPort::Number(n)) => n,
        Some(RawPort::Signed(n)) if n <= 0 => return Ok(None),
        Some(RawPort::Signed(n)) => n as u64,
        Some(RawPort::Float(f)) if f.fract() == 0.0 && f > 0.0 => f as u64,
        Some(RawPort::Float(_)) => return Ok(None),
        Some(RawPort::Text(s)) => match s.trim().parse::<u64>() {
            Ok(n) => n,
            Err(_) => return Ok(None),
        },
    };

    if value == 0 {
        return Ok(None);
    }
    u16::try_from(value)
        .map(Some)
        .map_err(|_| serde::de::Error::custom(ConfigurationError::PortOutOfRange(value)))
}

fn deserialize_container<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}
