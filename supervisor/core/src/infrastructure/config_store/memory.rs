// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::domain::agent::AgentConfiguration;
use crate::domain::config_store::{ConfigStore, ConfigStoreError};

#[derive(Default)]
struct StoreState {
    config: Option<AgentConfiguration>,
    read_failure: Option<ConfigStoreError>,
    write_failure: Option<ConfigStoreError>,
}

#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AgentConfiguration) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.write() {
            state.config = Some(config);
        }
        store
    }

    pub fn current(&self) -> Option<AgentConfiguration> {
        self.state.read().ok().and_then(|s| s.config.clone())
    }

    /// Every `get_config` fails with `err` until cleared.
    pub fn fail_reads(&self, err: ConfigStoreError) {
        if let Ok(mut state) = self.state.write() {
            state.read_failure = Some(err);
        }
    }

    /// Every `put_config` and `delete_config` fails with `err` until cleared.
    pub fn fail_writes(&self, err: ConfigStoreError) {
        if let Ok(mut state) = self.state.write() {
            state.write_failure = Some(err);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.write() {
            state.read_failure = None;
            state.write_failure = None;
        }
    }
}

fn poisoned() -> ConfigStoreError {
    ConfigStoreError::Io("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_config(&self) -> Result<Option<AgentConfiguration>, ConfigStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        match &state.read_failure {
            Some(err) => Err(err.clone()),
            None => Ok(state.config.clone()),
        }
    }

    async fn put_config(&self, config: AgentConfiguration) -> Result<AgentConfiguration, ConfigStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if let Some(err) = &state.write_failure {
            return Err(err.clone());
        }
        state.config = Some(config.clone());
        Ok(config)
    }

    async fn delete_config(&self) -> Result<(), ConfigStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if let Some(err) = &state.write_failure {
            return Err(err.clone());
        }
        state.config = None;
        Ok(())
    }
}
