// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Reconciliation Engine
//!
//! Owns the lifecycle state of the single agent and closes the gap between
//! the stored configuration and what the container runtime reports.
//!
//! ```text
//! Uninitialized ──config──▶ Initializing ──found──▶ Running
//!                               │                    ▲   │ observed != running
//!                               └──absent──▶ Starting ◀──┘
//!                                               │ outer retry exhausted
//!                                               ▼
//!                                             Failed
//! ```
//!
//! At most one launch cycle runs per engine. Self-heal, restart and
//! settings changes that arrive while a cycle is outstanding coalesce into
//! it; every outer attempt re-reads the configuration snapshot, so a change
//! applied mid-recovery is picked up by the next attempt.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Lifecycle state machine, single in-flight launch guard,
//!   self-healing and forced teardown

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::launcher::AgentLauncher;
use crate::application::locator::AgentLocator;
use crate::application::retry::{retry_if, RetryPolicy};
use crate::application::status_poller::{Observation, ObservationSink, PollerHandle, StatusPoller};
use crate::domain::agent::{AgentConfiguration, ConfigurationError};
use crate::domain::config_store::{ConfigStore, ConfigStoreError};
use crate::domain::container::{ContainerRecord, ContainerState};
use crate::domain::events::EngineEvent;
use crate::domain::lifecycle::{LifecycleState, LocateError, ReconcileError};
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use crate::domain::supervisor_config::ReconciliationSettings;
use crate::infrastructure::event_bus::{EngineEventBus, EngineEventReceiver};

/// Timings for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    /// Outer budget: whole "ensure running" attempts before `Failed`.
    pub launch: RetryPolicy,
    /// Inner budget: discovery polls after the run command.
    pub confirm: RetryPolicy,
}

impl EngineSettings {
    pub fn from_reconciliation(settings: &ReconciliationSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            launch: RetryPolicy::new(settings.launch_attempts, settings.launch_delay()),
            confirm: RetryPolicy::new(settings.confirm_attempts, settings.confirm_delay()),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_reconciliation(&ReconciliationSettings::default())
    }
}

/// Failures of the imperative engine API (stop, refresh, apply).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid agent configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),

    #[error(transparent)]
    ConfigStore(#[from] ConfigStoreError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Engine has been shut down")]
    ShutDown,
}

struct EngineState {
    lifecycle: LifecycleState,
    record: Option<ContainerRecord>,
    config: Option<AgentConfiguration>,
    last_observed: Option<ContainerState>,
}

/// What a launch cycle does before invoking the launcher.
enum Prelude {
    Nothing,
    /// Remove a container the poller saw in a state that needs recovery.
    RemoveStale(ContainerRecord),
    /// Remove whatever agent container currently exists.
    RemoveCurrent,
}

struct EngineInner {
    runtime: Arc<dyn ContainerRuntime>,
    config_store: Arc<dyn ConfigStore>,
    launcher: AgentLauncher,
    settings: EngineSettings,
    state: Mutex<EngineState>,
    launch_in_flight: AtomicBool,
    events: EngineEventBus,
    shutdown: CancellationToken,
    poller: Mutex<Option<PollerHandle>>,
}

pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

impl ReconciliationEngine {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config_store: Arc<dyn ConfigStore>,
        settings: EngineSettings,
    ) -> Self {
        let launcher = AgentLauncher::new(runtime.clone(), settings.confirm);
        Self {
            inner: Arc::new(EngineInner {
                runtime,
                config_store,
                launcher,
                settings,
                state: Mutex::new(EngineState {
                    lifecycle: LifecycleState::Uninitialized,
                    record: None,
                    config: None,
                    last_observed: None,
                }),
                launch_in_flight: AtomicBool::new(false),
                events: EngineEventBus::with_default_capacity(),
                shutdown: CancellationToken::new(),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle.clone()
    }

    pub fn container_record(&self) -> Option<ContainerRecord> {
        self.inner.state.lock().record.clone()
    }

    /// The read-only configuration snapshot the engine is working from.
    pub fn configuration(&self) -> Option<AgentConfiguration> {
        self.inner.state.lock().config.clone()
    }

    pub fn subscribe(&self) -> EngineEventReceiver {
        self.inner.events.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Load configuration and bring the agent up.
    ///
    /// Only acts from `Uninitialized`; otherwise returns the current state.
    /// Resolves once the engine has settled in `Running`, `Failed`, or back
    /// in `Uninitialized` when there is nothing to run.
    pub async fn start(&self) -> LifecycleState {
        self.inner.start().await
    }

    /// Force a fresh launch: remove the current agent container and run one
    /// launch cycle. Coalesces with a cycle already in flight.
    pub async fn restart_agent(&self) -> LifecycleState {
        self.inner.restart().await
    }

    /// Re-read the configuration snapshot from the store.
    pub async fn refresh_config(&self) -> Result<Option<AgentConfiguration>, EngineError> {
        self.inner.refresh_config().await
    }

    /// Settings change: validate, persist, refresh and recreate the agent.
    pub async fn apply_configuration(&self, config: AgentConfiguration) -> Result<LifecycleState, EngineError> {
        self.inner.apply_configuration(config).await
    }

    /// Remove the agent container and delete the stored configuration.
    ///
    /// The lifecycle state is left as is; the engine is finished afterwards
    /// and the owner is expected to discard it.
    pub async fn stop(&self) -> Result<Option<String>, EngineError> {
        self.inner.stop().await
    }

    /// Stop polling and refuse new launch cycles. An attempt already in
    /// flight runs to completion.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let poller = self.inner.poller.lock().take();
        if let Some(poller) = poller {
            poller.stop().await;
        }
        info!("Reconciliation engine shut down");
    }
}

impl Drop for ReconciliationEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl EngineInner {
    async fn start(self: &Arc<Self>) -> LifecycleState {
        if self.shutdown.is_cancelled() || self.lifecycle() != LifecycleState::Uninitialized {
            return self.lifecycle();
        }

        let config = match self.load_config().await {
            Some(config) => config,
            None => return self.lifecycle(),
        };
        if !config.wants_agent() {
            match config.validate() {
                Err(e) if config.enabled => warn!(error = %e, "Stored agent configuration is invalid"),
                _ => debug!("Agent disabled in configuration"),
            }
            self.ensure_agent_absent().await;
            return self.lifecycle();
        }

        self.set_lifecycle(LifecycleState::Initializing);

        match self.launcher.locator().find_agent_container().await {
            Ok(Some(record)) => {
                info!(container_id = %record.short_id(), state = %record.state, "Found existing agent container");
                self.record_running(record);
                self.ensure_poller();
                self.lifecycle()
            }
            Ok(None) => {
                self.ensure_poller();
                self.launch_cycle(Prelude::Nothing).await
            }
            Err(e @ LocateError::Integrity { .. }) => {
                error!(error = %e, "Agent container ownership conflict");
                self.set_lifecycle(LifecycleState::Failed { error: e.into() });
                self.lifecycle()
            }
            Err(e) => {
                // The launcher locates again; let the outer retry absorb the outage.
                warn!(error = %e, "Initial agent lookup failed");
                self.ensure_poller();
                self.launch_cycle(Prelude::Nothing).await
            }
        }
    }

    async fn restart(self: &Arc<Self>) -> LifecycleState {
        if self.shutdown.is_cancelled() {
            return self.lifecycle();
        }

        if self.usable_config().is_none() {
            return self.withdraw_agent().await;
        }

        if self.lifecycle() == LifecycleState::Uninitialized {
            self.set_lifecycle(LifecycleState::Initializing);
        }
        self.ensure_poller();
        self.launch_cycle(Prelude::RemoveCurrent).await
    }

    async fn refresh_config(self: &Arc<Self>) -> Result<Option<AgentConfiguration>, EngineError> {
        match self.config_store.get_config().await {
            Ok(config) => {
                self.state.lock().config = config.clone();
                if self.usable_config().is_none() {
                    self.withdraw_agent().await;
                }
                Ok(config)
            }
            Err(ConfigStoreError::Unauthorized(msg)) => {
                self.force_teardown(msg.clone()).await;
                Err(ConfigStoreError::Unauthorized(msg).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_configuration(self: &Arc<Self>, config: AgentConfiguration) -> Result<LifecycleState, EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShutDown);
        }
        config.validate()?;
        if !config.has_traffic_filter() {
            warn!("No target port or container configured, the agent will capture all traffic");
        }

        let stored = match self.config_store.put_config(config).await {
            Ok(stored) => stored,
            Err(ConfigStoreError::Unauthorized(msg)) => {
                self.force_teardown(msg.clone()).await;
                return Err(ConfigStoreError::Unauthorized(msg).into());
            }
            Err(e) => return Err(e.into()),
        };
        info!(project = %stored.project_name, enabled = stored.enabled, "Applied agent configuration");
        self.state.lock().config = Some(stored);

        Ok(self.restart().await)
    }

    async fn stop(self: &Arc<Self>) -> Result<Option<String>, EngineError> {
        self.shutdown.cancel();
        self.cancel_poller();

        let removed = match self.launcher.locator().find_agent_container().await? {
            Some(record) => {
                self.runtime.remove_container(&record.id, true).await?;
                info!(container_id = %record.short_id(), "Removed agent container");
                Some(record.id)
            }
            None => None,
        };
        self.config_store.delete_config().await?;

        {
            let mut state = self.state.lock();
            state.config = None;
            state.record = None;
        }
        self.events.publish(EngineEvent::AgentStopped {
            removed_container: removed.clone(),
            stopped_at: Utc::now(),
        });
        Ok(removed)
    }

    /// Credentials were rejected: tear everything down and tell subscribers.
    async fn force_teardown(self: &Arc<Self>, reason: String) {
        warn!(reason = %reason, "Agent credentials rejected, tearing down");
        self.shutdown.cancel();
        self.cancel_poller();

        match self.launcher.locator().find_agent_container().await {
            Ok(Some(record)) => {
                if let Err(e) = self.runtime.remove_container(&record.id, true).await {
                    warn!(container_id = %record.short_id(), error = %e, "Failed to remove agent container during teardown");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to locate agent container during teardown"),
        }
        if let Err(e) = self.config_store.delete_config().await {
            warn!(error = %e, "Failed to delete agent configuration during teardown");
        }

        {
            let mut state = self.state.lock();
            state.config = None;
            state.record = None;
        }
        self.events.publish(EngineEvent::TornDown {
            reason: ReconcileError::Authorization(reason),
            torn_down_at: Utc::now(),
        });
    }

    /// Fetch and snapshot the configuration. Fetch failures other than an
    /// authorization rejection count as "no configuration".
    async fn load_config(self: &Arc<Self>) -> Option<AgentConfiguration> {
        match self.config_store.get_config().await {
            Ok(Some(config)) => {
                self.state.lock().config = Some(config.clone());
                Some(config)
            }
            Ok(None) => {
                info!("No agent configuration stored");
                self.state.lock().config = None;
                // Absent configuration means no agent should exist.
                self.ensure_agent_absent().await;
                None
            }
            Err(ConfigStoreError::Unauthorized(msg)) => {
                self.force_teardown(msg).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load agent configuration");
                None
            }
        }
    }

    /// No usable configuration: no agent may exist and nothing is watched.
    async fn withdraw_agent(&self) -> LifecycleState {
        info!("No usable agent configuration, removing agent");
        self.cancel_poller();
        self.ensure_agent_absent().await;
        let mut state = self.state.lock();
        state.record = None;
        state.last_observed = None;
        self.transition(&mut state, LifecycleState::Uninitialized);
        state.lifecycle.clone()
    }

    async fn ensure_agent_absent(&self) {
        match self.launcher.locator().find_agent_container().await {
            Ok(Some(record)) => match self.runtime.remove_container(&record.id, true).await {
                Ok(()) => info!(container_id = %record.short_id(), "Removed agent container for disabled configuration"),
                Err(e) => warn!(container_id = %record.short_id(), error = %e, "Failed to remove agent container"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to check for agent container"),
        }
    }

    /// One guarded "ensure running" cycle with the outer retry budget.
    async fn launch_cycle(self: &Arc<Self>, prelude: Prelude) -> LifecycleState {
        if self.shutdown.is_cancelled() {
            return self.lifecycle();
        }
        if self.usable_config().is_none() {
            return self.withdraw_agent().await;
        }
        if self
            .launch_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Launch already in flight, coalescing");
            return self.lifecycle();
        }
        let _in_flight = scopeguard::guard(&self.launch_in_flight, |flag| flag.store(false, Ordering::SeqCst));

        {
            let mut state = self.state.lock();
            state.record = None;
            self.transition(&mut state, LifecycleState::Starting);
        }

        match prelude {
            Prelude::Nothing => {}
            Prelude::RemoveStale(stale) => {
                info!(container_id = %stale.short_id(), state = %stale.state, "Removing stale agent container");
                if let Err(e) = self.runtime.remove_container(&stale.id, true).await {
                    warn!(container_id = %stale.short_id(), error = %e, "Failed to remove stale agent container");
                }
            }
            Prelude::RemoveCurrent => self.ensure_agent_absent().await,
        }

        let max_attempts = self.settings.launch.effective_attempts();
        let retryable = |e: &ReconcileError| {
            !matches!(e, ReconcileError::Configuration(_)) && !self.shutdown.is_cancelled()
        };
        let outcome = retry_if(self.settings.launch, retryable, |attempt| {
            let inner = self.clone();
            async move {
                if inner.shutdown.is_cancelled() {
                    return Err(ReconcileError::Launch("engine shut down".to_string()));
                }
                let config = inner
                    .usable_config()
                    .ok_or_else(|| ReconcileError::Configuration("no agent configuration".to_string()))?;

                inner.launcher.ensure_running(&config).await.map_err(|e| {
                    inner.events.publish(EngineEvent::LaunchAttemptFailed {
                        attempt,
                        max_attempts,
                        error: e.to_string(),
                        failed_at: Utc::now(),
                    });
                    ReconcileError::from(e)
                })
            }
        })
        .await;

        // The configuration was withdrawn while the cycle ran.
        let withdrawn =
            self.usable_config().is_none() || matches!(outcome, Err(ReconcileError::Configuration(_)));
        if withdrawn && !self.shutdown.is_cancelled() {
            return self.withdraw_agent().await;
        }

        let mut state = self.state.lock();
        match outcome {
            Ok(record) => match state.lifecycle {
                LifecycleState::Starting | LifecycleState::Running => {
                    info!(container_id = %record.short_id(), "Agent running");
                    state.record = Some(record);
                    self.transition(&mut state, LifecycleState::Running);
                }
                _ => debug!(lifecycle = %state.lifecycle, "Launch finished after the engine moved on"),
            },
            Err(e) => {
                if state.lifecycle == LifecycleState::Starting && !self.shutdown.is_cancelled() {
                    error!(error = %e, attempts = max_attempts, "Agent launch failed");
                    self.transition(&mut state, LifecycleState::Failed { error: e });
                } else {
                    debug!(error = %e, lifecycle = %state.lifecycle, "Launch failure ignored");
                }
            }
        }
        state.lifecycle.clone()
    }

    fn observe(self: &Arc<Self>, observation: Observation) {
        let mut self_heal = None;
        {
            let mut state = self.state.lock();
            let previous = state.last_observed.replace(observation.state);
            if previous != Some(observation.state) {
                self.events.publish(EngineEvent::ContainerStateObserved {
                    container_id: observation.record.as_ref().map(|r| r.id.clone()),
                    previous,
                    state: observation.state,
                    observed_at: observation.observed_at,
                });
            }

            match state.lifecycle {
                LifecycleState::Running if observation.state.is_healthy() => {
                    state.record = observation.record;
                }
                LifecycleState::Running => {
                    warn!(observed = %observation.state, "Agent container is no longer running");
                    self.events.publish(EngineEvent::SelfHealTriggered {
                        observed: observation.state,
                        triggered_at: Utc::now(),
                    });
                    state.record = None;
                    self.transition(&mut state, LifecycleState::Starting);
                    self_heal = Some(observation.record.filter(|r| r.state.requires_recovery()));
                }
                LifecycleState::Starting if observation.state.is_healthy() => {
                    if let Some(record) = observation.record {
                        state.record = Some(record);
                        self.transition(&mut state, LifecycleState::Running);
                    }
                }
                _ => {}
            }
        }

        if let Some(stale) = self_heal {
            if self.shutdown.is_cancelled() {
                return;
            }
            metrics::counter!("agent_supervisor_self_heals_total").increment(1);
            let inner = self.clone();
            let prelude = stale.map_or(Prelude::Nothing, Prelude::RemoveStale);
            tokio::spawn(async move {
                inner.launch_cycle(prelude).await;
            });
        }
    }

    fn poll_failed(&self, err: LocateError) {
        metrics::counter!("agent_supervisor_poll_errors_total").increment(1);
        warn!(error = %err, "Agent status poll failed");
        self.events.publish(EngineEvent::PollFailed {
            error: err.to_string(),
            failed_at: Utc::now(),
        });

        if matches!(err, LocateError::Integrity { .. }) {
            let mut state = self.state.lock();
            if !state.lifecycle.is_failed() {
                state.record = None;
                self.transition(&mut state, LifecycleState::Failed { error: err.into() });
            }
        }
    }

    fn ensure_poller(self: &Arc<Self>) {
        let mut poller = self.poller.lock();
        if poller.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        let sink = Arc::new(EngineObserver {
            inner: Arc::downgrade(self),
        });
        *poller = Some(StatusPoller::spawn(
            AgentLocator::new(self.runtime.clone()),
            self.settings.poll_interval,
            sink,
            &self.shutdown,
        ));
    }

    fn cancel_poller(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.cancel();
        }
    }

    fn record_running(&self, record: ContainerRecord) {
        let mut state = self.state.lock();
        state.last_observed = Some(record.state);
        state.record = Some(record);
        self.transition(&mut state, LifecycleState::Running);
    }

    fn lifecycle(&self) -> LifecycleState {
        self.state.lock().lifecycle.clone()
    }

    fn usable_config(&self) -> Option<AgentConfiguration> {
        self.state.lock().config.clone().filter(AgentConfiguration::wants_agent)
    }

    fn set_lifecycle(&self, to: LifecycleState) {
        let mut state = self.state.lock();
        self.transition(&mut state, to);
    }

    fn transition(&self, state: &mut EngineState, to: LifecycleState) {
        if state.lifecycle == to {
            return;
        }
        let from = std::mem::replace(&mut state.lifecycle, to.clone());
        info!(from = %from, to = %to, "Lifecycle transition");
        self.events.publish(EngineEvent::lifecycle_changed(from, to));
    }
}

/// Poller sink. Holds the engine weakly so the poll task never keeps a
/// discarded engine alive.
struct EngineObserver {
    inner: Weak<EngineInner>,
}

#[async_trait]
impl ObservationSink for EngineObserver {
    async fn on_observation(&self, observation: Observation) {
        if let Some(inner) = self.inner.upgrade() {
            inner.observe(observation);
        }
    }

    async fn on_poll_error(&self, error: LocateError) {
        if let Some(inner) = self.inner.upgrade() {
            inner.poll_failed(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AGENT_CONTAINER_NAME, AGENT_IMAGE, OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE};
    use crate::infrastructure::config_store::InMemoryConfigStore;
    use crate::infrastructure::memory_runtime::InMemoryRuntime;

    fn settings() -> EngineSettings {
        EngineSettings {
            poll_interval: Duration::from_secs(2),
            launch: RetryPolicy::new(3, Duration::from_secs(1)),
            confirm: RetryPolicy::new(3, Duration::from_secs(3)),
        }
    }

    fn config() -> AgentConfiguration {
        AgentConfiguration::new("key-id", "key-secret", "checkout-service").with_target_port(8080)
    }

    fn agent(state: ContainerState) -> ContainerRecord {
        ContainerRecord {
            id: "9d2e7f0b1c44".to_string(),
            image: AGENT_IMAGE.to_string(),
            command: "apidump --project checkout-service".to_string(),
            names: vec![format!("/{}", AGENT_CONTAINER_NAME)],
            state,
            labels: [(OWNERSHIP_LABEL_KEY.to_string(), OWNERSHIP_LABEL_VALUE.to_string())].into(),
        }
    }

    fn engine(runtime: &InMemoryRuntime, store: &InMemoryConfigStore) -> ReconciliationEngine {
        ReconciliationEngine::new(Arc::new(runtime.clone()), Arc::new(store.clone()), settings())
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_agent_goes_straight_to_running() {
        let runtime = InMemoryRuntime::new().with_container(agent(ContainerState::Running));
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);

        assert_eq!(engine.start().await, LifecycleState::Running);
        assert_eq!(runtime.run_count(), 0);
        assert_eq!(engine.container_record().map(|r| r.id), Some("9d2e7f0b1c44".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_config_stays_uninitialized() {
        let runtime = InMemoryRuntime::new();
        let engine = engine(&runtime, &InMemoryConfigStore::new());

        assert_eq!(engine.start().await, LifecycleState::Uninitialized);
        assert_eq!(runtime.run_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_fetch_failure_is_treated_as_absent() {
        let runtime = InMemoryRuntime::new().with_container(agent(ContainerState::Running));
        let store = InMemoryConfigStore::with_config(config());
        store.fail_reads(ConfigStoreError::Unavailable("timeout".to_string()));
        let engine = engine(&runtime, &store);

        assert_eq!(engine.start().await, LifecycleState::Uninitialized);
        // A transient fetch failure does not tear the agent down.
        assert_eq!(runtime.containers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_defers_to_caller() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(AgentConfiguration::new("key", "", "proj"));
        let engine = engine(&runtime, &store);

        assert_eq!(engine.start().await, LifecycleState::Uninitialized);
        assert_eq!(runtime.run_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);

        assert_eq!(engine.start().await, LifecycleState::Running);
        assert_eq!(engine.start().await, LifecycleState::Running);
        assert_eq!(runtime.run_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_agents_fail_with_integrity_error() {
        let mut second = agent(ContainerState::Exited);
        second.id = "0a1b2c3d4e5f".to_string();
        let runtime = InMemoryRuntime::new()
            .with_container(agent(ContainerState::Running))
            .with_container(second);
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);

        let state = engine.start().await;
        assert!(matches!(state.failure(), Some(ReconcileError::Integrity(_))));
        assert_eq!(runtime.removed().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_the_container() {
        let runtime = InMemoryRuntime::new().with_container(agent(ContainerState::Running));
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);
        engine.start().await;

        assert_eq!(engine.restart_agent().await, LifecycleState::Running);
        assert_eq!(runtime.removed(), vec!["9d2e7f0b1c44".to_string()]);
        assert_eq!(runtime.run_count(), 1);
        assert_ne!(engine.container_record().map(|r| r.id), Some("9d2e7f0b1c44".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_recovers_from_failed() {
        let runtime = InMemoryRuntime::new();
        runtime.fail_runs(RuntimeError::RunFailed("daemon not responding".to_string()));
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);

        assert!(engine.start().await.is_failed());
        runtime.clear_failures();
        assert_eq!(engine.restart_agent().await, LifecycleState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_configuration_recreates_agent_with_new_settings() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);
        engine.start().await;

        let updated = config().with_target_container("abc123");
        assert_eq!(engine.apply_configuration(updated.clone()).await.unwrap(), LifecycleState::Running);

        assert_eq!(store.current(), Some(updated));
        let runs = runtime.runs();
        assert_eq!(runs.len(), 2);
        assert!(runs[1].cli_args().iter().any(|a| a == "container:abc123"));
        assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_invalid_configuration_is_rejected() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::new();
        let engine = engine(&runtime, &store);

        let err = engine
            .apply_configuration(AgentConfiguration::new("", "secret", "proj"))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::InvalidConfiguration(ConfigurationError::MissingApiKey));
        assert_eq!(store.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_disabled_configuration_removes_agent() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);
        engine.start().await;

        let state = engine.apply_configuration(config().disabled()).await.unwrap();
        assert_eq!(state, LifecycleState::Uninitialized);
        assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);

        // The poller is gone, so nothing relaunches the agent.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runtime.run_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_config_updates_snapshot() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::new();
        let engine = engine(&runtime, &store);
        assert_eq!(engine.configuration(), None);

        store.put_config(config()).await.unwrap();
        assert_eq!(engine.refresh_config().await.unwrap(), Some(config()));
        assert_eq!(engine.configuration(), Some(config()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_removes_container_and_config() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);
        engine.start().await;
        let mut events = engine.subscribe();

        let removed = engine.stop().await.unwrap();

        assert!(removed.is_some());
        assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);
        assert_eq!(store.current(), None);
        assert_eq!(engine.lifecycle_state(), LifecycleState::Running);
        assert!(engine.is_shut_down());
        assert!(events
            .drain()
            .iter()
            .any(|e| matches!(e, EngineEvent::AgentStopped { removed_container: Some(_), .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_integrity_error_during_poll_fails_engine() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);
        engine.start().await;

        let mut imposter = agent(ContainerState::Running);
        imposter.id = "ffffffffffff".to_string();
        runtime.insert_container(imposter);
        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert!(matches!(
            engine.lifecycle_state().failure(),
            Some(ReconcileError::Integrity(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_engine_stops_polling() {
        let runtime = InMemoryRuntime::new();
        let store = InMemoryConfigStore::with_config(config());
        let engine = engine(&runtime, &store);
        engine.start().await;
        let calls = runtime.list_calls();

        drop(engine);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(runtime.list_calls(), calls);
    }
}
