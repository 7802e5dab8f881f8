// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adapter Factory - Application Layer
//!
//! Builds the concrete runtime and configuration store selected in
//! `SupervisorConfig`, and wires them into a reconciliation engine. The
//! domain layer only ever sees the `ContainerRuntime` and `ConfigStore` ports.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select and construct infrastructure adapters from configuration

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::application::engine::{EngineSettings, ReconciliationEngine};
use crate::domain::config_store::{ConfigStore, ConfigStoreError};
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use crate::domain::supervisor_config::{ConfigStoreSettings, RuntimeBackend, RuntimeSettings, SupervisorConfig};
use crate::infrastructure::config_store::{FileConfigStore, HttpConfigStore};
use crate::infrastructure::docker_cli_runtime::DockerCliRuntime;
use crate::infrastructure::docker_runtime::DockerRuntime;

/// Creates a ContainerRuntime implementation based on the configured backend
pub fn create_runtime(settings: &RuntimeSettings) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    match settings.backend {
        RuntimeBackend::DockerApi => Ok(Arc::new(DockerRuntime::new(settings.docker_socket_path.clone())?)),
        RuntimeBackend::DockerCli => Ok(Arc::new(DockerCliRuntime::new(settings.docker_binary.clone()))),
    }
}

/// Creates a ConfigStore implementation based on the configured backend
pub fn create_config_store(settings: &ConfigStoreSettings) -> Result<Arc<dyn ConfigStore>, ConfigStoreError> {
    match settings {
        ConfigStoreSettings::File { path } => Ok(Arc::new(FileConfigStore::new(path.clone()))),
        ConfigStoreSettings::Http { base_url, timeout_ms } => Ok(Arc::new(HttpConfigStore::new(
            base_url.clone(),
            Duration::from_millis(*timeout_ms),
        )?)),
    }
}

pub fn create_engine(config: &SupervisorConfig) -> anyhow::Result<ReconciliationEngine> {
    let runtime = create_runtime(&config.runtime).context("Failed to initialize container runtime")?;
    let store = create_config_store(&config.config_store).context("Failed to initialize configuration store")?;
    Ok(ReconciliationEngine::new(
        runtime,
        store,
        EngineSettings::from_reconciliation(&config.reconciliation),
    ))
}
