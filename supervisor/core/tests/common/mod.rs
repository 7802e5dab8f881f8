// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the engine scenario tests.

#![allow(dead_code)]

use agent_supervisor_core::application::{EngineSettings, ReconciliationEngine, RetryPolicy};
use agent_supervisor_core::domain::agent::{
    AgentConfiguration, AGENT_CONTAINER_NAME, AGENT_IMAGE, OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE,
};
use agent_supervisor_core::domain::container::{ContainerRecord, ContainerState};
use agent_supervisor_core::domain::run_spec::RunRequest;
use agent_supervisor_core::domain::runtime::{ContainerRuntime, RuntimeError};
use agent_supervisor_core::infrastructure::config_store::InMemoryConfigStore;
use agent_supervisor_core::infrastructure::InMemoryRuntime;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const LAUNCH_DELAY: Duration = Duration::from_secs(1);
pub const CONFIRM_DELAY: Duration = Duration::from_secs(3);

pub fn settings() -> EngineSettings {
    EngineSettings {
        poll_interval: POLL_INTERVAL,
        launch: RetryPolicy::new(3, LAUNCH_DELAY),
        confirm: RetryPolicy::new(3, CONFIRM_DELAY),
    }
}

pub fn config() -> AgentConfiguration {
    AgentConfiguration::new("apikey-7f3a", "secret-19bd", "checkout-service")
}

pub fn agent_record(id: &str, state: ContainerState) -> ContainerRecord {
    ContainerRecord {
        id: id.to_string(),
        image: AGENT_IMAGE.to_string(),
        command: "apidump --project checkout-service".to_string(),
        names: vec![format!("/{}", AGENT_CONTAINER_NAME)],
        state,
        labels: [(OWNERSHIP_LABEL_KEY.to_string(), OWNERSHIP_LABEL_VALUE.to_string())].into(),
    }
}

pub fn engine_with(runtime: Arc<dyn ContainerRuntime>, store: &InMemoryConfigStore) -> ReconciliationEngine {
    ReconciliationEngine::new(runtime, Arc::new(store.clone()), settings())
}

pub fn engine(runtime: &InMemoryRuntime, store: &InMemoryConfigStore) -> ReconciliationEngine {
    engine_with(Arc::new(runtime.clone()), store)
}

/// Fails the first `failures` run commands, then delegates.
pub struct FlakyRuntime {
    inner: InMemoryRuntime,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyRuntime {
    pub fn new(inner: InMemoryRuntime, failures: u32) -> Self {
        Self {
            inner,
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn run_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FlakyRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, RuntimeError> {
        self.inner.list_containers(include_stopped).await
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError> {
        self.inner.pull_image(reference).await
    }

    async fn run_container(&self, request: &RunRequest) -> Result<(), RuntimeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(RuntimeError::Unavailable(format!("daemon restarting (attempt {})", attempt)));
        }
        self.inner.run_container(request).await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.inner.remove_container(id, force).await
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<serde_json::Value>, RuntimeError> {
        self.inner.inspect_container(name_or_id).await
    }
}
