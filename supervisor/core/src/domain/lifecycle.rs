// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine Lifecycle
//!
//! The reconciliation engine's own view of progress, distinct from the raw
//! container state reported by the runtime.
//!
//! ```text
//! Uninitialized → Initializing → (Running | Starting) → (Running ⇄ Starting) → Failed
//! ```
//!
//! `Failed` is only reachable from `Starting` once the outer retry budget is
//! spent, or when the runtime reports an ownership conflict. There is no
//! stopped state: stopping means the owner discards the engine.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Lifecycle state machine states and the error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::runtime::RuntimeError;

/// Errors from resolving the agent container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// More than one container carries the reserved name. Never resolved
    /// automatically since neither can be trusted as authoritative.
    #[error("Found {count} containers named {name}; refusing to pick one")]
    Integrity { name: String, count: usize },
}

/// The launcher could not confirm a running agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("Failed to locate agent container: {0}")]
    Locate(LocateError),

    #[error("Failed to run agent container: {0}")]
    Run(RuntimeError),

    #[error("Agent container not discoverable after {attempts} attempts")]
    NotConfirmed { attempts: u32 },
}

impl From<LocateError> for LaunchError {
    fn from(err: LocateError) -> Self {
        LaunchError::Locate(err)
    }
}

impl LaunchError {
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, LaunchError::Locate(LocateError::Integrity { .. }))
    }
}

/// The error attached to a terminal `Failed` state or reported to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ReconcileError {
    /// Launch attempts exhausted.
    #[error("{0}")]
    Launch(String),

    #[error("{0}")]
    Integrity(String),

    /// Missing or invalid configuration; the engine defers to its owner.
    #[error("{0}")]
    Configuration(String),

    /// Credentials rejected by the backing service.
    #[error("{0}")]
    Authorization(String),
}

impl From<LaunchError> for ReconcileError {
    fn from(err: LaunchError) -> Self {
        if err.is_integrity_violation() {
            ReconcileError::Integrity(err.to_string())
        } else {
            ReconcileError::Launch(err.to_string())
        }
    }
}

impl From<LocateError> for ReconcileError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::Integrity { .. } => ReconcileError::Integrity(err.to_string()),
            LocateError::Runtime(_) => ReconcileError::Launch(err.to_string()),
        }
    }
}

/// Closed set of engine states. UI labels are derived by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Starting,
    Running,
    Failed { error: ReconcileError },
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LifecycleState::Failed { .. })
    }

    pub fn failure(&self) -> Option<&ReconcileError> {
        match self {
            LifecycleState::Failed { error } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Failed { error } => write!(f, "failed: {}", error),
            other => f.write_str(other.name()),
        }
    }
}
