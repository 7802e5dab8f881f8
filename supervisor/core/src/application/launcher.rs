// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Launcher
//!
//! Idempotently ensures the agent container exists:
//!
//! ```text
//! locate ──found──▶ return record
//!    │
//!    └─absent──▶ pull (best effort) ──▶ run ──▶ confirm (retry locate)
//! ```
//!
//! The locator's existence check is what prevents duplicate containers; the
//! launcher never restarts a container that already exists, even one that
//! is not yet `running`. Callers serialize invocations.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pull + run + confirm sequence for the agent container

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::locator::AgentLocator;
use crate::application::retry::{retry, RetryPolicy};
use crate::domain::agent::{AgentConfiguration, AGENT_IMAGE};
use crate::domain::container::ContainerRecord;
use crate::domain::lifecycle::LaunchError;
use crate::domain::run_spec::RunRequest;
use crate::domain::runtime::ContainerRuntime;

pub struct AgentLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    locator: AgentLocator,
    confirm: RetryPolicy,
}

impl AgentLauncher {
    /// `confirm` bounds the discovery polls issued after the run command.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, confirm: RetryPolicy) -> Self {
        let locator = AgentLocator::new(runtime.clone());
        Self {
            runtime,
            locator,
            confirm,
        }
    }

    pub fn locator(&self) -> &AgentLocator {
        &self.locator
    }

    pub async fn ensure_running(&self, config: &AgentConfiguration) -> Result<ContainerRecord, LaunchError> {
        if let Some(existing) = self.locator.find_agent_container().await? {
            debug!(
                container_id = %existing.short_id(),
                state = %existing.state,
                "Agent container already exists, not launching"
            );
            return Ok(existing);
        }

        metrics::counter!("agent_supervisor_launch_attempts_total").increment(1);

        // A cached image is good enough when the registry is unreachable.
        if let Err(e) = self.runtime.pull_image(AGENT_IMAGE).await {
            warn!(image = AGENT_IMAGE, error = %e, "Image pull failed, continuing with cached image");
        }

        let request = RunRequest::for_agent(config);
        info!(args = ?request.redacted_args(), "Starting agent container");
        if let Err(e) = self.runtime.run_container(&request).await {
            metrics::counter!("agent_supervisor_launch_failures_total").increment(1);
            return Err(LaunchError::Run(e));
        }

        match self.confirm_started().await {
            Ok(record) => {
                info!(container_id = %record.short_id(), state = %record.state, "Agent container confirmed");
                Ok(record)
            }
            Err(e) => {
                metrics::counter!("agent_supervisor_launch_failures_total").increment(1);
                Err(e)
            }
        }
    }

    async fn confirm_started(&self) -> Result<ContainerRecord, LaunchError> {
        let attempts = self.confirm.effective_attempts();
        retry(self.confirm, |attempt| async move {
            match self.locator.find_agent_container().await {
                Ok(Some(record)) => Ok(record),
                Ok(None) => {
                    debug!(attempt, "Agent container not discoverable yet");
                    Err(LaunchError::NotConfirmed { attempts })
                }
                Err(e) => Err(LaunchError::Locate(e)),
            }
        })
        .await
    }
}
