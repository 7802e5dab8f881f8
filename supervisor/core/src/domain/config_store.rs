// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::agent::AgentConfiguration;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigStoreError {
    /// The backing service rejected our credentials. Retrying cannot help.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid agent configuration: {0}")]
    Invalid(String),

    #[error("Configuration service unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration storage error: {0}")]
    Io(String),
}

/// Persistence for the single agent configuration.
///
/// Absence is not an error: `get_config` returns `Ok(None)`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self) -> Result<Option<AgentConfiguration>, ConfigStoreError>;

    /// Replace the stored configuration wholesale and return what was stored.
    async fn put_config(&self, config: AgentConfiguration) -> Result<AgentConfiguration, ConfigStoreError>;

    /// Deleting a missing configuration succeeds.
    async fn delete_config(&self) -> Result<(), ConfigStoreError>;
}
