// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON file backed configuration store.
//!
//! The document holds credentials, so it is written owner-only on unix and
//! replaced atomically through a sibling temp file.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::agent::AgentConfiguration;
use crate::domain::config_store::{ConfigStore, ConfigStoreError};

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "agent.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ConfigStoreError {
    ConfigStoreError::Io(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get_config(&self) -> Result<Option<AgentConfiguration>, ConfigStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No agent configuration file");
                return Ok(None);
            }
            Err(e) => return Err(io_error(&self.path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConfigStoreError::Invalid(format!("{}: {}", self.path.display(), e)))
    }

    async fn put_config(&self, config: AgentConfiguration) -> Result<AgentConfiguration, ConfigStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(&config).map_err(|e| ConfigStoreError::Invalid(e.to_string()))?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json).await.map_err(|e| io_error(&tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| io_error(&tmp, e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        debug!(path = %self.path.display(), "Stored agent configuration");
        Ok(config)
    }

    async fn delete_config(&self) -> Result<(), ConfigStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}
