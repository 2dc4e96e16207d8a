//! Client for the compose API

use anyhow::{Context, Result};
use composer_common::{ComposeMetadata, ComposeRequest, ComposeResult, ComposeStatus, Version};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client for interacting with a compose service
pub struct ComposeClient {
    base_url: String,
    client: reqwest::Client,
}

/// Error body returned by the service
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl ComposeClient {
    /// Create a new client for the service at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Submit a compose request
    pub async fn compose(&self, request: &ComposeRequest) -> Result<ComposeResult> {
        let url = format!("{}/compose", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to connect to compose service")?;

        if response.status() != reqwest::StatusCode::CREATED {
            anyhow::bail!("Compose request rejected: {}", error_message(response).await);
        }

        response
            .json()
            .await
            .context("Failed to parse compose response")
    }

    /// Get compose status, `None` if the service does not know the compose
    pub async fn compose_status(&self, id: &str) -> Result<Option<ComposeStatus>> {
        self.get_optional(&format!("{}/compose/{}", self.base_url, id))
            .await
    }

    /// Get compose metadata, `None` if unknown or not available yet
    pub async fn compose_metadata(&self, id: &str) -> Result<Option<ComposeMetadata>> {
        self.get_optional(&format!("{}/compose/{}/metadata", self.base_url, id))
            .await
    }

    pub async fn openapi(&self) -> Result<Value> {
        self.get(&format!("{}/openapi.json", self.base_url)).await
    }

    pub async fn version(&self) -> Result<Version> {
        self.get(&format!("{}/version", self.base_url)).await
    }

    /// Poll until the compose reaches `success` or `failure`
    pub async fn poll_until_terminal(
        &self,
        id: &str,
        interval: Duration,
        attempts: usize,
    ) -> Result<ComposeStatus> {
        for _ in 0..attempts {
            let status = self
                .compose_status(id)
                .await?
                .with_context(|| format!("Unknown compose id: {}", id))?;

            if status.image_status.is_terminal() {
                return Ok(status);
            }

            debug!("Compose {} is {}", id, status.image_status.status);
            tokio::time::sleep(interval).await;
        }

        anyhow::bail!("Compose {} did not finish after {} polls", id, attempts)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_optional(url)
            .await?
            .with_context(|| format!("Not found: {}", url))
    }

    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            anyhow::bail!("Request failed: {}", error_message(response).await);
        }

        let body = response
            .json()
            .await
            .context("Failed to parse compose service response")?;

        Ok(Some(body))
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => format!("{} {}", status, body.error),
        Err(_) => status.to_string(),
    }
}
