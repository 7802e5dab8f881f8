// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::container::ContainerRecord;
use crate::domain::run_spec::RunRequest;

/// Failures talking to the container runtime. All of these are treated as
/// transient and retried by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Runtime command failed: {0}")]
    CommandFailed(String),
    #[error("Failed to pull image {image}: {reason}")]
    PullFailed { image: String, reason: String },
    #[error("Failed to start container: {0}")]
    RunFailed(String),
    #[error("Failed to remove container {id}: {reason}")]
    RemoveFailed { id: String, reason: String },
    #[error("Unexpected runtime response: {0}")]
    Malformed(String),
}

/// The narrow slice of the host container runtime the supervisor needs.
///
/// Constructed once by the owner of the engine and passed in; there is no
/// process-wide client handle.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers. `include_stopped` must be true to see exited or dead agents.
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, RuntimeError>;

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError>;

    /// Start a detached container described by `request`.
    async fn run_container(&self, request: &RunRequest) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    /// Raw inspect payload, `None` when nothing has that name or id.
    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<serde_json::Value>, RuntimeError>;
}
