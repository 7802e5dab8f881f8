// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Status Poller - Background observation of the agent container
//!
//! Locates the agent on a fixed interval and hands each observation to a
//! sink. The task is owned through a [`PollerHandle`]; dropping the handle
//! cancels it, so no timer outlives its owner.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cancellable interval loop feeding the reconciliation engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::locator::AgentLocator;
use crate::domain::container::{ContainerRecord, ContainerState};
use crate::domain::lifecycle::LocateError;

/// One poll result. `state` is `None` when no owned agent exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub state: ContainerState,
    pub record: Option<ContainerRecord>,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn from_record(record: Option<ContainerRecord>) -> Self {
        Self {
            state: record.as_ref().map(|r| r.state).unwrap_or(ContainerState::None),
            record,
            observed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn on_observation(&self, observation: Observation);

    async fn on_poll_error(&self, error: LocateError);
}

pub struct StatusPoller;

impl StatusPoller {
    /// Spawn the poll loop. The first poll happens one `period` from now.
    ///
    /// The loop also stops when `parent` is cancelled.
    pub fn spawn(
        locator: AgentLocator,
        period: Duration,
        sink: Arc<dyn ObservationSink>,
        parent: &CancellationToken,
    ) -> PollerHandle {
        let token = parent.child_token();
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "Starting agent status poller");

            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match locator.find_agent_container().await {
                            Ok(record) => {
                                let observation = Observation::from_record(record);
                                debug!(state = %observation.state, "Observed agent state");
                                sink.on_observation(observation).await;
                            }
                            Err(e) => sink.on_poll_error(e).await,
                        }
                    }
                    _ = loop_token.cancelled() => {
                        info!("Agent status poller shutting down");
                        break;
                    }
                }
            }
        });

        PollerHandle {
            token,
            task: Some(task),
        }
    }
}

/// Owns a running poll loop. Cancels it on drop.
pub struct PollerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
