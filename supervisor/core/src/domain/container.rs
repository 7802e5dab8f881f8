// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Observed Container State
//!
//! `ContainerRecord` is a point-in-time snapshot returned by the runtime. It is
//! fetched fresh on every query and never cached beyond one reconciliation tick.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Observed runtime state and the ownership predicate

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::agent::{AGENT_CONTAINER_NAME, AGENT_IMAGE, OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE};

/// Runtime-reported container state, plus `None` for "no matching container".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Exited,
    Paused,
    Dead,
    None,
}

impl ContainerState {
    /// Only `running` counts as healthy.
    pub fn is_healthy(self) -> bool {
        matches!(self, ContainerState::Running)
    }

    /// Acceptable while the agent is still coming up.
    pub fn is_transient(self) -> bool {
        matches!(self, ContainerState::Created | ContainerState::Restarting)
    }

    /// States that need a relaunch or a failure report.
    pub fn requires_recovery(self) -> bool {
        matches!(
            self,
            ContainerState::Exited | ContainerState::Paused | ContainerState::Dead | ContainerState::None
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Restarting => "restarting",
            ContainerState::Exited => "exited",
            ContainerState::Paused => "paused",
            ContainerState::Dead => "dead",
            ContainerState::None => "none",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ContainerState {
    /// Map a runtime state string. Never fails: `removing` is folded into
    /// `exited` and anything unrecognised is treated as `dead`.
    pub fn from_runtime(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "restarting" => ContainerState::Restarting,
            "exited" | "removing" => ContainerState::Exited,
            "paused" => ContainerState::Paused,
            "none" | "" => ContainerState::None,
            _ => ContainerState::Dead,
        }
    }
}

/// A container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub image: String,
    pub command: String,
    pub names: Vec<String>,
    pub state: ContainerState,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ContainerRecord {
    /// Runtimes prefix names with `/`; compare without it.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }

    pub fn has_agent_name(&self) -> bool {
        self.has_name(AGENT_CONTAINER_NAME)
    }

    /// Accepts the bare reference or a registry-qualified form of it.
    pub fn has_agent_image(&self) -> bool {
        self.image == AGENT_IMAGE || self.image.ends_with(&format!("/{}", AGENT_IMAGE))
    }

    pub fn has_ownership_label(&self) -> bool {
        self.labels.get(OWNERSHIP_LABEL_KEY).map(String::as_str) == Some(OWNERSHIP_LABEL_VALUE)
    }

    /// The ownership predicate: name, image and label must all match.
    pub fn is_owned_agent(&self) -> bool {
        self.has_agent_name() && self.has_agent_image() && self.has_ownership_label()
    }

    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(12);
        &self.id[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_record() -> ContainerRecord {
        ContainerRecord {
            id: "0123456789abcdef".to_string(),
            image: AGENT_IMAGE.to_string(),
            command: "apidump --project p".to_string(),
            names: vec![format!("/{}", AGENT_CONTAINER_NAME)],
            state: ContainerState::Running,
            labels: HashMap::from([(OWNERSHIP_LABEL_KEY.to_string(), OWNERSHIP_LABEL_VALUE.to_string())]),
        }
    }

    #[test]
    fn test_ownership_predicate_matches_agent() {
        assert!(agent_record().is_owned_agent());
    }

    #[test]
    fn test_registry_qualified_image_matches() {
        let mut record = agent_record();
        record.image = format!("docker.io/{}", AGENT_IMAGE);
        assert!(record.is_owned_agent());
    }

    #[test]
    fn test_foreign_label_is_not_owned() {
        let mut record = agent_record();
        record.labels.insert(OWNERSHIP_LABEL_KEY.to_string(), "false".to_string());
        assert!(!record.is_owned_agent());

        record.labels.clear();
        assert!(!record.is_owned_agent());
    }

    #[test]
    fn test_name_is_compared_exactly() {
        let mut record = agent_record();
        record.names = vec![format!("/{}-old", AGENT_CONTAINER_NAME)];
        assert!(!record.is_owned_agent());
    }

    #[test]
    fn test_state_classification() {
        assert!(ContainerState::Running.is_healthy());
        assert!(ContainerState::Created.is_transient());
        assert!(ContainerState::Restarting.is_transient());
        for state in [ContainerState::Exited, ContainerState::Paused, ContainerState::Dead, ContainerState::None] {
            assert!(state.requires_recovery(), "{} should require recovery", state);
            assert!(!state.is_healthy());
        }
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(ContainerState::from_runtime("Running"), ContainerState::Running);
        assert_eq!(ContainerState::from_runtime("removing"), ContainerState::Exited);
        assert_eq!(ContainerState::from_runtime("bogus"), ContainerState::Dead);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(agent_record().short_id(), "0123456789ab");
    }
}
