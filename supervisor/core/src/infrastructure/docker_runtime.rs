// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::container::{ContainerRecord, ContainerState};
use crate::domain::run_spec::RunRequest;
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(socket_path: Option<String>) -> Result<Self, RuntimeError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - On Linux: Current user not in 'docker' group",
                    e
                ))
            })?
        };

        Ok(Self { docker })
    }
}

fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn is_not_found(err: &BollardError) -> bool {
    status_code(err) == Some(404)
}

/// Server-side rejections are command failures; anything else means we never
/// got a usable answer from the daemon.
fn command_error(err: BollardError) -> RuntimeError {
    match status_code(&err) {
        Some(_) => RuntimeError::CommandFailed(err.to_string()),
        None => RuntimeError::Unavailable(err.to_string()),
    }
}

/// Build a record from a list entry in Engine API JSON shape.
///
/// Entries without an id are skipped.
pub(crate) fn record_from_summary(summary: &Value) -> Option<ContainerRecord> {
    let id = summary.get("Id")?.as_str()?.to_string();
    let text = |key: &str| summary.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    let names = summary
        .get("Names")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let labels = summary
        .get("Labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();
    let state = ContainerState::from_runtime(&text("State"));

    Some(ContainerRecord {
        id,
        image: text("Image"),
        command: text("Command"),
        names,
        state,
        labels,
    })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await.map_err(command_error)?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let value = serde_json::to_value(&summary).map_err(|e| RuntimeError::Malformed(e.to_string()))?;
            if let Some(record) = record_from_summary(&value) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError> {
        info!("Pulling image: {}", reference);
        let options = Some(CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(image = reference, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::PullFailed {
                        image: reference.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        info!("Successfully pulled image: {}", reference);
        Ok(())
    }

    async fn run_container(&self, request: &RunRequest) -> Result<(), RuntimeError> {
        let host_config = HostConfig {
            auto_remove: Some(request.auto_remove),
            network_mode: Some(request.network.as_runtime_value()),
            ..Default::default()
        };
        let config = Config {
            image: Some(request.image.clone()),
            cmd: Some(request.command.clone()),
            env: Some(request.env_pairs()),
            labels: Some(request.labels.clone().into_iter().collect::<HashMap<_, _>>()),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::RunFailed(e.to_string()))?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::RunFailed(e.to_string()))?;

        info!(container_id = %created.id, name = %request.name, "Container started");
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // Auto-removed containers can disappear between list and remove.
            Err(e) if is_not_found(&e) => {
                debug!(container_id = id, "Container already gone");
                Ok(())
            }
            Err(e) => Err(RuntimeError::RemoveFailed {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<Value>, RuntimeError> {
        match self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => serde_json::to_value(&inspect)
                .map(Some)
                .map_err(|e| RuntimeError::Malformed(e.to_string())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(command_error(e)),
        }
    }
}
