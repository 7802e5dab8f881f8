// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end reconciliation scenarios against the in-memory runtime.
//!
//! All tests run on paused tokio time so retry delays and poll intervals
//! advance instantly and deterministically.

mod common;

use agent_supervisor_core::application::EngineError;
use agent_supervisor_core::domain::agent::AGENT_CONTAINER_NAME;
use agent_supervisor_core::domain::container::ContainerState;
use agent_supervisor_core::domain::events::EngineEvent;
use agent_supervisor_core::domain::lifecycle::{LifecycleState, ReconcileError};
use agent_supervisor_core::domain::config_store::{ConfigStore, ConfigStoreError};
use agent_supervisor_core::domain::runtime::RuntimeError;
use agent_supervisor_core::infrastructure::config_store::InMemoryConfigStore;
use agent_supervisor_core::infrastructure::InMemoryRuntime;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn transitions(events: &[EngineEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::LifecycleChanged { to, .. } => Some(to.name()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_launch_with_port_filter_ends_running() {
    let runtime = InMemoryRuntime::new().with_visibility_lag(1);
    let store = InMemoryConfigStore::with_config(config().with_target_port(8080));
    let engine = engine(&runtime, &store);
    let mut events = engine.subscribe();

    let state = engine.start().await;

    assert_eq!(state, LifecycleState::Running);
    assert_eq!(runtime.pulls().len(), 1);
    let runs = runtime.runs();
    assert_eq!(runs.len(), 1);
    let args = runs[0].cli_args();
    assert!(args.windows(2).any(|w| w[0] == "--filter" && w[1] == "port 8080"));
    assert!(args.iter().any(|a| a == "--rm"));
    assert!(engine.container_record().is_some_and(|r| r.is_owned_agent()));
    assert_eq!(transitions(&events.drain()), vec!["initializing", "starting", "running"]);
}

#[tokio::test(start_paused = true)]
async fn test_container_scope_suppresses_port_filter() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config().with_target_port(8080).with_target_container("abc123"));
    let engine = engine(&runtime, &store);

    assert_eq!(engine.start().await, LifecycleState::Running);

    let args = runtime.runs()[0].cli_args();
    assert!(args.windows(2).any(|w| w[0] == "--network" && w[1] == "container:abc123"));
    assert!(!args.iter().any(|a| a == "--filter" || a.contains("port 8080")));
}

#[tokio::test(start_paused = true)]
async fn test_runtime_outage_exhausts_outer_retry_and_fails() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_runs(RuntimeError::RunFailed("Cannot connect to the Docker daemon".to_string()));
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    let mut events = engine.subscribe();
    let started = Instant::now();

    let state = engine.start().await;

    match state.failure() {
        Some(ReconcileError::Launch(msg)) => assert!(msg.contains("Cannot connect to the Docker daemon")),
        other => panic!("expected launch failure, got {:?}", other),
    }
    assert_eq!(runtime.run_count(), 3);
    assert!(started.elapsed() >= LAUNCH_DELAY * 2);

    let drained = events.drain();
    let failed_attempts = drained
        .iter()
        .filter(|e| matches!(e, EngineEvent::LaunchAttemptFailed { .. }))
        .count();
    assert_eq!(failed_attempts, 3);
    assert_eq!(transitions(&drained).last(), Some(&"failed"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_engine_does_not_recover_on_its_own() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_runs(RuntimeError::RunFailed("no space left on device".to_string()));
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);

    assert!(engine.start().await.is_failed());
    runtime.clear_failures();
    sleep(POLL_INTERVAL * 10).await;

    assert!(engine.lifecycle_state().is_failed());
    assert_eq!(runtime.run_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_run_failures_are_retried() {
    let flaky = Arc::new(FlakyRuntime::new(InMemoryRuntime::new(), 2));
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine_with(flaky.clone(), &store);

    assert_eq!(engine.start().await, LifecycleState::Running);
    assert_eq!(flaky.run_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_container_is_relaunched_once() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    assert_eq!(engine.start().await, LifecycleState::Running);
    let mut events = engine.subscribe();

    // Discovery lags long enough for several poll ticks to land mid-launch.
    runtime.set_visibility_lag(2);
    runtime.vanish(AGENT_CONTAINER_NAME);
    sleep(POLL_INTERVAL * 6).await;

    assert_eq!(engine.lifecycle_state(), LifecycleState::Running);
    assert_eq!(runtime.run_count(), 2);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 1);

    let drained = events.drain();
    let heals = drained
        .iter()
        .filter(|e| matches!(e, EngineEvent::SelfHealTriggered { observed: ContainerState::None, .. }))
        .count();
    assert_eq!(heals, 1);
    assert_eq!(transitions(&drained), vec!["starting", "running"]);
}

#[tokio::test(start_paused = true)]
async fn test_exited_container_is_removed_and_relaunched() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    engine.start().await;
    let original = engine.container_record().map(|r| r.id);

    runtime.set_state(AGENT_CONTAINER_NAME, ContainerState::Exited);
    sleep(POLL_INTERVAL * 3).await;

    assert_eq!(engine.lifecycle_state(), LifecycleState::Running);
    assert_eq!(runtime.removed(), original.into_iter().collect::<Vec<_>>());
    assert_eq!(runtime.run_count(), 2);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 1);
}

#[tokio::test(start_paused = true)]
async fn test_existing_healthy_agent_is_adopted() {
    let runtime = InMemoryRuntime::new().with_container(agent_record("5e6f7a8b9c0d", ContainerState::Running));
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);

    assert_eq!(engine.start().await, LifecycleState::Running);
    sleep(POLL_INTERVAL * 3).await;

    assert_eq!(runtime.run_count(), 0);
    assert_eq!(engine.container_record().map(|r| r.id), Some("5e6f7a8b9c0d".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_configuration_removes_agent() {
    let runtime = InMemoryRuntime::new().with_container(agent_record("5e6f7a8b9c0d", ContainerState::Running));
    let store = InMemoryConfigStore::with_config(config().disabled());
    let engine = engine(&runtime, &store);

    assert_eq!(engine.start().await, LifecycleState::Uninitialized);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);
    assert_eq!(runtime.run_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_absent_configuration_removes_leftover_agent() {
    let runtime = InMemoryRuntime::new().with_container(agent_record("5e6f7a8b9c0d", ContainerState::Exited));
    let engine = engine(&runtime, &InMemoryConfigStore::new());

    assert_eq!(engine.start().await, LifecycleState::Uninitialized);
    assert_eq!(runtime.removed(), vec!["5e6f7a8b9c0d".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_force_teardown() {
    let runtime = InMemoryRuntime::new().with_container(agent_record("5e6f7a8b9c0d", ContainerState::Running));
    let store = InMemoryConfigStore::with_config(config());
    store.fail_reads(ConfigStoreError::Unauthorized("401 Unauthorized".to_string()));
    let engine = engine(&runtime, &store);
    let mut events = engine.subscribe();

    assert_eq!(engine.start().await, LifecycleState::Uninitialized);

    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);
    assert_eq!(store.current(), None);
    assert!(engine.is_shut_down());
    assert!(events.drain().iter().any(|e| matches!(
        e,
        EngineEvent::TornDown { reason: ReconcileError::Authorization(_), .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_restarts_coalesce() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    engine.start().await;

    runtime.set_visibility_lag(1);
    let (first, second) = tokio::join!(engine.restart_agent(), engine.restart_agent());

    assert_eq!(first, LifecycleState::Running);
    assert_eq!(second, LifecycleState::Starting);
    assert_eq!(runtime.run_count(), 2);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_tears_down_and_stops_polling() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    engine.start().await;

    let removed = engine.stop().await.unwrap();

    assert!(removed.is_some());
    assert_eq!(store.current(), None);
    sleep(POLL_INTERVAL * 5).await;
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);
    assert_eq!(runtime.run_count(), 1);
    assert_eq!(engine.restart_agent().await, LifecycleState::Running);
    assert_eq!(runtime.run_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_remove_failure_and_keeps_configuration() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    engine.start().await;
    runtime.fail_removes(RuntimeError::RemoveFailed {
        id: AGENT_CONTAINER_NAME.to_string(),
        reason: "device or resource busy".to_string(),
    });

    let err = engine.stop().await.unwrap_err();

    assert!(matches!(err, EngineError::Runtime(RuntimeError::RemoveFailed { .. })));
    assert!(store.current().is_some());
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_to_disabled_configuration_removes_running_agent() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    assert_eq!(engine.start().await, LifecycleState::Running);

    store.put_config(config().disabled()).await.unwrap();
    engine.refresh_config().await.unwrap();

    assert_eq!(engine.lifecycle_state(), LifecycleState::Uninitialized);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);
    assert!(engine.container_record().is_none());

    let polls = runtime.list_calls();
    sleep(POLL_INTERVAL * 5).await;
    assert_eq!(runtime.list_calls(), polls);
    assert_eq!(runtime.run_count(), 1);
    assert_eq!(engine.lifecycle_state(), LifecycleState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_to_absent_configuration_removes_running_agent() {
    let runtime = InMemoryRuntime::new();
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    engine.start().await;

    store.delete_config().await.unwrap();
    assert_eq!(engine.refresh_config().await.unwrap(), None);

    assert_eq!(engine.lifecycle_state(), LifecycleState::Uninitialized);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_withdrawn_mid_launch_defers_instead_of_failing() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_runs(RuntimeError::RunFailed("Cannot connect to the Docker daemon".to_string()));
    let store = InMemoryConfigStore::with_config(config());
    let engine = engine(&runtime, &store);
    let mut events = engine.subscribe();

    let (state, refreshed) = tokio::join!(engine.start(), async {
        sleep(LAUNCH_DELAY / 2).await;
        store.put_config(config().disabled()).await.unwrap();
        engine.refresh_config().await
    });

    assert!(refreshed.is_ok());
    assert_eq!(state, LifecycleState::Uninitialized);
    assert_eq!(runtime.run_count(), 1);
    assert_eq!(runtime.count_named(AGENT_CONTAINER_NAME), 0);

    let drained = events.drain();
    assert!(!transitions(&drained).contains(&"failed"));
    let failed_attempts = drained
        .iter()
        .filter(|e| matches!(e, EngineEvent::LaunchAttemptFailed { .. }))
        .count();
    assert_eq!(failed_attempts, 1);

    sleep(POLL_INTERVAL * 5).await;
    assert_eq!(engine.lifecycle_state(), LifecycleState::Uninitialized);
    assert_eq!(runtime.run_count(), 1);
}
