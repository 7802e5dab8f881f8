// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory container runtime for testing and local development.
//!
//! Behaves like a single-host runtime: names are unique, `run` creates a
//! container in the configured start state and `remove` of an unknown id
//! fails. Failures and discovery lag can be injected per operation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::domain::container::{ContainerRecord, ContainerState};
use crate::domain::run_spec::RunRequest;
use crate::domain::runtime::{ContainerRuntime, RuntimeError};

#[derive(Default)]
struct RuntimeState {
    containers: Vec<ContainerRecord>,
    /// A started container that becomes visible after `remaining` listings.
    pending: Option<(u32, ContainerRecord)>,
    runs: Vec<RunRequest>,
    pulls: Vec<String>,
    removed: Vec<String>,
    list_calls: u32,
    inspect_calls: u32,
    next_id: u64,
    started_state: Option<ContainerState>,
    visibility_lag: u32,
    omit_labels: bool,
    fail_list: Option<RuntimeError>,
    fail_pull: Option<RuntimeError>,
    fail_run: Option<RuntimeError>,
    fail_remove: Option<RuntimeError>,
}

impl RuntimeState {
    fn position(&self, name_or_id: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id == name_or_id || c.has_name(name_or_id))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, record: ContainerRecord) -> Self {
        self.insert_container(record);
        self
    }

    /// Listings report no labels, forcing callers onto the inspect path.
    pub fn omit_labels_in_listing(self) -> Self {
        self.state.lock().omit_labels = true;
        self
    }

    /// State new containers start in. Defaults to `running`.
    pub fn start_containers_in(self, state: ContainerState) -> Self {
        self.state.lock().started_state = Some(state);
        self
    }

    /// Started containers only appear after `listings` further list calls.
    pub fn with_visibility_lag(self, listings: u32) -> Self {
        self.set_visibility_lag(listings);
        self
    }

    pub fn set_visibility_lag(&self, listings: u32) {
        self.state.lock().visibility_lag = listings;
    }

    pub fn insert_container(&self, record: ContainerRecord) {
        self.state.lock().containers.push(record);
    }

    /// Change the state of a container, as if the runtime had moved it.
    pub fn set_state(&self, name_or_id: &str, new_state: ContainerState) -> bool {
        let mut state = self.state.lock();
        match state.position(name_or_id) {
            Some(idx) => {
                state.containers[idx].state = new_state;
                true
            }
            None => false,
        }
    }

    /// Remove a container behind the supervisor's back.
    pub fn vanish(&self, name_or_id: &str) {
        let mut state = self.state.lock();
        if let Some(idx) = state.position(name_or_id) {
            state.containers.remove(idx);
        }
    }

    pub fn fail_lists(&self, err: RuntimeError) {
        self.state.lock().fail_list = Some(err);
    }

    pub fn fail_pulls(&self, err: RuntimeError) {
        self.state.lock().fail_pull = Some(err);
    }

    pub fn fail_runs(&self, err: RuntimeError) {
        self.state.lock().fail_run = Some(err);
    }

    pub fn fail_removes(&self, err: RuntimeError) {
        self.state.lock().fail_remove = Some(err);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_list = None;
        state.fail_pull = None;
        state.fail_run = None;
        state.fail_remove = None;
    }

    pub fn containers(&self) -> Vec<ContainerRecord> {
        self.state.lock().containers.clone()
    }

    /// Containers bearing `name`, including one still pending visibility.
    pub fn count_named(&self, name: &str) -> usize {
        let state = self.state.lock();
        let pending = state.pending.as_ref().filter(|(_, c)| c.has_name(name)).map_or(0, |_| 1);
        state.containers.iter().filter(|c| c.has_name(name)).count() + pending
    }

    pub fn runs(&self) -> Vec<RunRequest> {
        self.state.lock().runs.clone()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().runs.len()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().pulls.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().list_calls
    }

    pub fn inspect_calls(&self) -> u32 {
        self.state.lock().inspect_calls
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if let Some(err) = state.fail_list.clone() {
            return Err(err);
        }

        if let Some((remaining, record)) = state.pending.take() {
            if remaining == 0 {
                state.containers.push(record);
            } else {
                state.pending = Some((remaining - 1, record));
            }
        }

        let omit_labels = state.omit_labels;
        Ok(state
            .containers
            .iter()
            .filter(|c| include_stopped || c.state == ContainerState::Running)
            .cloned()
            .map(|mut c| {
                if omit_labels {
                    c.labels.clear();
                }
                c
            })
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.pulls.push(reference.to_string());
        match state.fail_pull.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_container(&self, request: &RunRequest) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.runs.push(request.clone());
        if let Some(err) = state.fail_run.clone() {
            return Err(err);
        }

        let name_taken = state.position(&request.name).is_some()
            || state.pending.as_ref().is_some_and(|(_, c)| c.has_name(&request.name));
        if name_taken {
            return Err(RuntimeError::RunFailed(format!(
                "Conflict. The container name \"/{}\" is already in use",
                request.name
            )));
        }

        state.next_id += 1;
        let record = ContainerRecord {
            id: format!("{:064x}", state.next_id),
            image: request.image.clone(),
            command: request.command.join(" "),
            names: vec![format!("/{}", request.name)],
            state: state.started_state.unwrap_or(ContainerState::Running),
            labels: request.labels.clone().into_iter().collect(),
        };

        if state.visibility_lag == 0 {
            state.containers.push(record);
        } else {
            state.pending = Some((state.visibility_lag, record));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_remove.clone() {
            return Err(err);
        }
        match state.position(id) {
            Some(idx) => {
                let removed = state.containers.remove(idx);
                state.removed.push(removed.id);
                Ok(())
            }
            None => Err(RuntimeError::RemoveFailed {
                id: id.to_string(),
                reason: "No such container".to_string(),
            }),
        }
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<serde_json::Value>, RuntimeError> {
        let mut state = self.state.lock();
        state.inspect_calls += 1;
        if let Some(err) = state.fail_list.clone() {
            return Err(err);
        }
        Ok(state.position(name_or_id).map(|idx| {
            let c = &state.containers[idx];
            serde_json::json!({
                "Id": c.id,
                "Name": c.names.first().cloned().unwrap_or_default(),
                "Config": { "Image": c.image, "Labels": c.labels },
                "State": { "Status": c.state.as_str() },
            })
        }))
    }
}
