// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Run Request
//!
//! Translates an [`AgentConfiguration`] into the exact container the runtime
//! should start. Port scoping and container scoping are mutually exclusive:
//! when both are configured the container wins and no port filter is emitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::agent::{
    AgentConfiguration, AGENT_CONTAINER_NAME, AGENT_IMAGE, API_KEY_ENV, API_SECRET_ENV,
    OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE,
};

/// Network namespace the agent captures traffic in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "target", rename_all = "snake_case")]
pub enum NetworkMode {
    Host,
    Container(String),
}

impl NetworkMode {
    /// Value understood by both `docker run --network` and the Engine API.
    pub fn as_runtime_value(&self) -> String {
        match self {
            NetworkMode::Host => "host".to_string(),
            NetworkMode::Container(target) => format!("container:{}", target),
        }
    }
}

/// Everything needed to start the agent container.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub image: String,
    pub name: String,
    pub network: NetworkMode,
    /// Ordered so rendered arguments are stable.
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub command: Vec<String>,
    pub auto_remove: bool,
}

impl RunRequest {
    pub fn for_agent(config: &AgentConfiguration) -> Self {
        let network = match &config.target_container {
            Some(target) => NetworkMode::Container(target.clone()),
            None => NetworkMode::Host,
        };

        let mut command = vec![
            "apidump".to_string(),
            "--project".to_string(),
            config.project_name.clone(),
        ];
        if let (Some(port), None) = (config.target_port, &config.target_container) {
            command.push("--filter".to_string());
            command.push(format!("port {}", port));
        }

        let env = BTreeMap::from([
            (API_KEY_ENV.to_string(), config.api_key.clone()),
            (API_SECRET_ENV.to_string(), config.api_secret.clone()),
        ]);
        let labels = BTreeMap::from([(OWNERSHIP_LABEL_KEY.to_string(), OWNERSHIP_LABEL_VALUE.to_string())]);

        Self {
            image: AGENT_IMAGE.to_string(),
            name: AGENT_CONTAINER_NAME.to_string(),
            network,
            env,
            labels,
            command,
            auto_remove: true,
        }
    }

    /// `KEY=VALUE` pairs as the runtime expects them.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Arguments following `docker run`, one argv element each.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.auto_remove {
            args.push("--rm".to_string());
        }
        args.push("--network".to_string());
        args.push(self.network.as_runtime_value());
        args.push("--name".to_string());
        args.push(self.name.clone());
        for (key, value) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for pair in self.env_pairs() {
            args.push("-e".to_string());
            args.push(pair);
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }

    /// Rendering safe for logs: credential values are masked.
    pub fn redacted_args(&self) -> Vec<String> {
        let mut masked = self.clone();
        for value in masked.env.values_mut() {
            *value = "***".to_string();
        }
        masked.cli_args()
    }
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("image", &self.image)
            .field("name", &self.name)
            .field("network", &self.network)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("labels", &self.labels)
            .field("command", &self.command)
            .field("auto_remove", &self.auto_remove)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_port_only_uses_host_network_and_filter() {
        let config = AgentConfiguration::new("key", "secret", "checkout").with_target_port(8080);
        let args = RunRequest::for_agent(&config).cli_args();

        assert!(has_pair(&args, "--network", "host"));
        assert!(has_pair(&args, "--filter", "port 8080"));
        assert!(has_pair(&args, "--name", AGENT_CONTAINER_NAME));
        assert_eq!(args.first().map(String::as_str), Some("--rm"));
    }

    #[test]
    fn test_container_scope_takes_precedence_over_port() {
        let config = AgentConfiguration::new("key", "secret", "checkout")
            .with_target_port(8080)
            .with_target_container("abc123");
        let args = RunRequest::for_agent(&config).cli_args();

        assert!(has_pair(&args, "--network", "container:abc123"));
        assert!(!args.iter().any(|a| a == "--filter"));
        assert!(!args.iter().any(|a| a.contains("port 8080")));
    }

    #[test]
    fn test_no_scope_has_no_filter() {
        let config = AgentConfiguration::new("key", "secret", "checkout");
        let request = RunRequest::for_agent(&config);
        assert_eq!(request.network, NetworkMode::Host);
        assert_eq!(request.command, vec!["apidump", "--project", "checkout"]);
    }

    #[test]
    fn test_credentials_and_label_are_injected() {
        let config = AgentConfiguration::new("key-id", "key-secret", "checkout");
        let args = RunRequest::for_agent(&config).cli_args();

        assert!(has_pair(&args, "-e", "AKITA_API_KEY_ID=key-id"));
        assert!(has_pair(&args, "-e", "AKITA_API_KEY_SECRET=key-secret"));
        assert!(has_pair(&args, "--label", "com.docker.desktop.extension=true"));

        let image_pos = args.iter().position(|a| a == AGENT_IMAGE).unwrap();
        assert_eq!(args[image_pos + 1], "apidump");
    }

    #[test]
    fn test_redacted_args_hide_credentials() {
        let config = AgentConfiguration::new("key-id", "key-secret", "checkout");
        let args = RunRequest::for_agent(&config).redacted_args();
        assert!(!args.iter().any(|a| a.contains("key-secret")));
        assert!(has_pair(&args, "-e", "AKITA_API_KEY_SECRET=***"));
    }
}
