// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container runtime backed by the `docker` binary.
//!
//! For hosts where the Engine API socket is not reachable but the CLI is
//! (remote contexts, rootless setups, desktop VMs).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Output;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::container::{ContainerRecord, ContainerState};
use crate::domain::run_spec::RunRequest;
use crate::domain::runtime::{ContainerRuntime, RuntimeError};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

pub struct DockerCliRuntime {
    binary: String,
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Command", default)]
    command: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

impl From<PsLine> for ContainerRecord {
    fn from(line: PsLine) -> Self {
        let state = ContainerState::from_runtime(&line.state);
        ContainerRecord {
            id: line.id,
            image: line.image,
            command: line.command.trim_matches('"').to_string(),
            names: split_list(&line.names).map(str::to_string).collect(),
            state,
            labels: parse_labels(&line.labels),
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `k=v,k2=v2` as printed by `docker ps`.
///
/// The format does not escape commas inside values. A segment without `=`
/// means some value was split, so the whole set is dropped and the locator
/// falls back to `inspect` for the authoritative labels.
fn parse_labels(raw: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    for pair in split_list(raw) {
        match pair.split_once('=') {
            Some((k, v)) => {
                labels.insert(k.to_string(), v.to_string());
            }
            None => {
                debug!(labels = raw, "Ambiguous label listing, deferring to inspect");
                return HashMap::new();
            }
        }
    }
    labels
}

pub(crate) fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerRecord>, RuntimeError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<PsLine>(line)
                .map(ContainerRecord::from)
                .map_err(|e| RuntimeError::Malformed(format!("docker ps line {:?}: {}", line, e)))
        })
        .collect()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn is_no_such_container(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

impl DockerCliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn exec(&self, args: &[String]) -> Result<Output, RuntimeError> {
        debug!(binary = %self.binary, subcommand = args.first().map(String::as_str).unwrap_or_default(), "Running docker command");
        let child = tokio::process::Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(COMMAND_TIMEOUT, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RuntimeError::Unavailable(format!("failed to run {}: {}", self.binary, e))),
            Err(_) => Err(RuntimeError::Unavailable(format!(
                "{} {} timed out after {}s",
                self.binary,
                args.first().map(String::as_str).unwrap_or_default(),
                COMMAND_TIMEOUT.as_secs()
            ))),
        }
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let mut cmd = args(["ps", "--no-trunc", "--format", "{{json .}}"]);
        if include_stopped {
            cmd.insert(1, "-a".to_string());
        }
        let output = self.exec(&cmd).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed(stderr_of(&output)));
        }
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError> {
        info!("Pulling image: {}", reference);
        let output = self.exec(&args(["pull", reference])).await?;
        if !output.status.success() {
            return Err(RuntimeError::PullFailed {
                image: reference.to_string(),
                reason: stderr_of(&output),
            });
        }
        Ok(())
    }

    async fn run_container(&self, request: &RunRequest) -> Result<(), RuntimeError> {
        let mut cmd = args(["run", "-d"]);
        cmd.extend(request.cli_args());

        let output = self.exec(&cmd).await?;
        if !output.status.success() {
            return Err(RuntimeError::RunFailed(stderr_of(&output)));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(container_id = %id, name = %request.name, "Container started");
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let cmd = if force { args(["rm", "-f", id]) } else { args(["rm", id]) };
        let output = self.exec(&cmd).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_of(&output);
        if is_no_such_container(&stderr) {
            debug!(container_id = id, "Container already gone");
            return Ok(());
        }
        Err(RuntimeError::RemoveFailed {
            id: id.to_string(),
            reason: stderr,
        })
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<Option<Value>, RuntimeError> {
        let output = self
            .exec(&args(["inspect", "--type", "container", name_or_id]))
            .await?;
        if !output.status.success() {
            let stderr = stderr_of(&output);
            if is_no_such_container(&stderr) {
                return Ok(None);
            }
            return Err(RuntimeError::CommandFailed(stderr));
        }

        let parsed: Vec<Value> =
            serde_json::from_slice(&output.stdout).map_err(|e| RuntimeError::Malformed(e.to_string()))?;
        Ok(parsed.into_iter().next())
    }
}
