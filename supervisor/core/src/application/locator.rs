// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Locator
//!
//! Resolves whether "the" agent container exists. Lists every container,
//! including stopped ones so an exited or dead agent is still discoverable,
//! and applies the ownership predicate (name, image, label).
//!
//! Pure query. Safe to call concurrently and often.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Ownership-checked lookup of the agent container

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::agent::AGENT_CONTAINER_NAME;
use crate::domain::container::{ContainerRecord, ContainerState};
use crate::domain::lifecycle::LocateError;
use crate::domain::runtime::ContainerRuntime;

#[derive(Clone)]
pub struct AgentLocator {
    runtime: Arc<dyn ContainerRuntime>,
}

impl AgentLocator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Return the agent container, `None` when no owned agent exists.
    ///
    /// More than one container with the reserved name is an integrity error,
    /// reported distinctly from "not found".
    pub async fn find_agent_container(&self) -> Result<Option<ContainerRecord>, LocateError> {
        let containers = self.runtime.list_containers(true).await?;

        let mut named: Vec<ContainerRecord> = containers
            .into_iter()
            .filter(|c| c.has_agent_name())
            .collect();

        if named.len() > 1 {
            warn!(count = named.len(), name = AGENT_CONTAINER_NAME, "Multiple containers claim the agent name");
            return Err(LocateError::Integrity {
                name: AGENT_CONTAINER_NAME.to_string(),
                count: named.len(),
            });
        }

        let Some(mut candidate) = named.pop() else {
            debug!("No container carries the agent name");
            return Ok(None);
        };

        // Some listings omit labels; fall back to inspect before judging ownership.
        if candidate.labels.is_empty() {
            self.enrich_from_inspect(&mut candidate).await?;
        }

        if candidate.is_owned_agent() {
            debug!(container_id = %candidate.short_id(), state = %candidate.state, "Located agent container");
            Ok(Some(candidate))
        } else {
            warn!(
                container_id = %candidate.short_id(),
                image = %candidate.image,
                "Container with agent name is not owned by this supervisor, ignoring"
            );
            Ok(None)
        }
    }

    /// Observed state of the agent, `ContainerState::None` when absent.
    pub async fn observe(&self) -> Result<(ContainerState, Option<ContainerRecord>), LocateError> {
        let record = self.find_agent_container().await?;
        let state = record.as_ref().map(|r| r.state).unwrap_or(ContainerState::None);
        Ok((state, record))
    }

    async fn enrich_from_inspect(&self, candidate: &mut ContainerRecord) -> Result<(), LocateError> {
        let Some(raw) = self.runtime.inspect_container(&candidate.id).await? else {
            return Ok(());
        };

        if let Some(labels) = raw.pointer("/Config/Labels").and_then(|v| v.as_object()) {
            candidate.labels = labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect::<HashMap<_, _>>();
        }
        if let Some(image) = raw.pointer("/Config/Image").and_then(|v| v.as_str()) {
            candidate.image = image.to_string();
        }
        if let Some(status) = raw.pointer("/State/Status").and_then(|v| v.as_str()) {
            candidate.state = ContainerState::from_runtime(status);
        }
        Ok(())
    }
}
