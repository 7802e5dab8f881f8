// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::container::ContainerState;
use crate::domain::lifecycle::{LifecycleState, ReconcileError};

/// Everything a subscriber (UI, CLI, log shipper) can observe about the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    LifecycleChanged {
        from: LifecycleState,
        to: LifecycleState,
        changed_at: DateTime<Utc>,
    },
    ContainerStateObserved {
        container_id: Option<String>,
        previous: Option<ContainerState>,
        state: ContainerState,
        observed_at: DateTime<Utc>,
    },
    LaunchAttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: String,
        failed_at: DateTime<Utc>,
    },
    SelfHealTriggered {
        observed: ContainerState,
        triggered_at: DateTime<Utc>,
    },
    PollFailed {
        error: String,
        failed_at: DateTime<Utc>,
    },
    AgentStopped {
        removed_container: Option<String>,
        stopped_at: DateTime<Utc>,
    },
    /// Forced teardown after the backing service rejected the credentials.
    TornDown {
        reason: ReconcileError,
        torn_down_at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn lifecycle_changed(from: LifecycleState, to: LifecycleState) -> Self {
        EngineEvent::LifecycleChanged {
            from,
            to,
            changed_at: Utc::now(),
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::LifecycleChanged { changed_at, .. } => *changed_at,
            EngineEvent::ContainerStateObserved { observed_at, .. } => *observed_at,
            EngineEvent::LaunchAttemptFailed { failed_at, .. } => *failed_at,
            EngineEvent::SelfHealTriggered { triggered_at, .. } => *triggered_at,
            EngineEvent::PollFailed { failed_at, .. } => *failed_at,
            EngineEvent::AgentStopped { stopped_at, .. } => *stopped_at,
            EngineEvent::TornDown { torn_down_at, .. } => *torn_down_at,
        }
    }
}
