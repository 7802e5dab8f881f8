// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote configuration service client.
//!
//! Talks to `GET | POST | DELETE {base_url}/agents/config`. A 404 on read
//! means no configuration; 401 and 403 mean the credentials were rejected,
//! which the engine answers with a forced teardown rather than a retry.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::domain::agent::AgentConfiguration;
use crate::domain::config_store::{ConfigStore, ConfigStoreError};

pub struct HttpConfigStore {
    base_url: String,
    client: Client,
}

impl HttpConfigStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigStoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigStoreError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/agents/config", self.base_url)
    }
}

fn transport_error(err: reqwest::Error) -> ConfigStoreError {
    ConfigStoreError::Unavailable(err.to_string())
}

/// Map non-success statuses onto the store's error taxonomy.
async fn check_status(response: Response) -> Result<Response, ConfigStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConfigStoreError::Unauthorized(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ConfigStoreError::Invalid(detail),
        _ => ConfigStoreError::Unavailable(detail),
    })
}

#[async_trait]
impl ConfigStore for HttpConfigStore {
    async fn get_config(&self) -> Result<Option<AgentConfiguration>, ConfigStoreError> {
        let response = self
            .client
            .get(self.endpoint())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Configuration service has no agent configuration");
            return Ok(None);
        }
        let bytes = check_status(response).await?.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConfigStoreError::Invalid(e.to_string()))
    }

    async fn put_config(&self, config: AgentConfiguration) -> Result<AgentConfiguration, ConfigStoreError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&config)
            .send()
            .await
            .map_err(transport_error)?;

        let bytes = check_status(response).await?.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Ok(config);
        }
        serde_json::from_slice(&bytes).map_err(|e| ConfigStoreError::Invalid(e.to_string()))
    }

    async fn delete_config(&self) -> Result<(), ConfigStoreError> {
        let response = self
            .client
            .delete(self.endpoint())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await.map(|_| ())
    }
}
