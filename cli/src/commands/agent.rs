// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent operations
//!
//! Commands: run, status, restart, stop

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use agent_supervisor_core::application::factory::{create_config_store, create_engine, create_runtime};
use agent_supervisor_core::application::AgentLocator;
use agent_supervisor_core::domain::container::ContainerState;
use agent_supervisor_core::domain::events::EngineEvent;
use agent_supervisor_core::domain::lifecycle::LifecycleState;
use agent_supervisor_core::domain::supervisor_config::SupervisorConfig;

use super::config::print_agent_configuration;

pub async fn run(config: &SupervisorConfig) -> Result<()> {
    if let Some(port) = config.observability.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .with_context(|| format!("Failed to start metrics exporter on port {}", port))?;
        info!(port, "Prometheus metrics exporter listening");
    }

    let engine = create_engine(config)?;
    let mut events = engine.subscribe();

    println!("{}", "Starting agent supervisor...".bold());

    let start = engine.start();
    tokio::pin!(start);
    let state = loop {
        tokio::select! {
            state = &mut start => break state,
            Some(event) = events.next() => print_event(&event),
        }
    };
    for event in events.drain() {
        print_event(&event);
    }

    match &state {
        LifecycleState::Running => {
            println!("{}", "✓ Agent is running".green());
            if let Some(agent) = engine.configuration() {
                if !agent.has_traffic_filter() {
                    println!(
                        "{}",
                        "⚠ No target port or container configured; the agent captures all host traffic".yellow()
                    );
                }
            }
        }
        LifecycleState::Uninitialized => {
            println!(
                "{}",
                "No enabled agent configuration. Use `agent-supervisor config set` to configure the agent.".yellow()
            );
            engine.shutdown().await;
            return Ok(());
        }
        other => {
            engine.shutdown().await;
            anyhow::bail!("Agent did not start: {}", other);
        }
    }

    println!("{}", "Reconciling. Press Ctrl-C to stop.".dimmed());

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            result = &mut interrupt => {
                result.context("Failed to listen for Ctrl-C")?;
                println!();
                info!("Interrupt received, shutting down");
                break;
            }
            Some(event) = events.next() => print_event(&event),
        }
    }

    engine.shutdown().await;
    println!("{}", "✓ Supervisor stopped (agent container left running)".green());
    Ok(())
}

pub async fn status(config: &SupervisorConfig) -> Result<()> {
    let runtime = create_runtime(&config.runtime).context("Failed to initialize container runtime")?;
    let store = create_config_store(&config.config_store).context("Failed to initialize configuration store")?;
    let locator = AgentLocator::new(runtime);

    println!("{}", "Agent container:".bold());
    match locator.find_agent_container().await {
        Ok(Some(record)) => {
            println!("  ID: {}", record.short_id());
            println!("  Image: {}", record.image);
            println!("  State: {}", colorize_container_state(record.state));
            println!("  Command: {}", record.command);
        }
        Ok(None) => println!("  {}", "(not running)".dimmed()),
        Err(e) => println!("  {}", format!("✗ {}", e).red()),
    }
    println!();

    println!("{}", "Agent configuration:".bold());
    match store
        .get_config()
        .await
        .context("Failed to read agent configuration")?
    {
        Some(agent) => print_agent_configuration(&agent),
        None => println!("  {}", "(not configured)".dimmed()),
    }

    Ok(())
}

pub async fn restart(config: &SupervisorConfig) -> Result<()> {
    let engine = create_engine(config)?;
    engine
        .refresh_config()
        .await
        .context("Failed to read agent configuration")?;

    println!("Restarting agent...");
    let state = engine.restart_agent().await;
    engine.shutdown().await;

    match &state {
        LifecycleState::Running => {
            println!("{}", "✓ Agent restarted".green());
            Ok(())
        }
        LifecycleState::Uninitialized => {
            println!("{}", "No enabled agent configuration; agent removed".yellow());
            Ok(())
        }
        other => anyhow::bail!("Agent restart failed: {}", other),
    }
}

pub async fn stop(config: &SupervisorConfig) -> Result<()> {
    let engine = create_engine(config)?;
    let removed = engine.stop().await.context("Failed to stop agent")?;

    match removed {
        Some(id) => println!(
            "{}",
            format!("✓ Removed agent container {}", &id[..id.len().min(12)]).green()
        ),
        None => println!("{}", "No agent container was running".dimmed()),
    }
    println!("{}", "✓ Agent configuration deleted".green());
    Ok(())
}

fn colorize_lifecycle(state: &LifecycleState) -> ColoredString {
    let text = state.to_string();
    match state {
        LifecycleState::Running => text.green(),
        LifecycleState::Failed { .. } => text.red(),
        LifecycleState::Initializing | LifecycleState::Starting => text.yellow(),
        LifecycleState::Uninitialized => text.dimmed(),
    }
}

fn colorize_container_state(state: ContainerState) -> ColoredString {
    let text = state.as_str();
    if state.is_healthy() {
        text.green()
    } else if state.is_transient() {
        text.yellow()
    } else {
        text.red()
    }
}

fn print_event(event: &EngineEvent) {
    let at = event
        .occurred_at()
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string()
        .dimmed();

    match event {
        EngineEvent::LifecycleChanged { from, to, .. } => {
            println!("{} {} → {}", at, from.name(), colorize_lifecycle(to));
        }
        EngineEvent::ContainerStateObserved { container_id, state, .. } => {
            let id = container_id
                .as_deref()
                .map(|id| &id[..id.len().min(12)])
                .unwrap_or("-");
            println!("{} container {} is {}", at, id, colorize_container_state(*state));
        }
        EngineEvent::LaunchAttemptFailed {
            attempt,
            max_attempts,
            error,
            ..
        } => {
            println!(
                "{} {}",
                at,
                format!("launch attempt {}/{} failed: {}", attempt, max_attempts, error).yellow()
            );
        }
        EngineEvent::SelfHealTriggered { observed, .. } => {
            println!("{} {}", at, format!("agent is {}, relaunching", observed).yellow());
        }
        EngineEvent::PollFailed { error, .. } => {
            println!("{} {}", at, format!("status poll failed: {}", error).yellow());
        }
        EngineEvent::AgentStopped { .. } => {
            println!("{} agent stopped", at);
        }
        EngineEvent::TornDown { reason, .. } => {
            println!("{} {}", at, format!("✗ agent torn down: {}", reason).red());
        }
    }
}
