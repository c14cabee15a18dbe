//! Gateway HTTP client

use super::{ClientError, LogSource, RecommendForm};
use crate::agent::RecommendResponse;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Talks to the gateway's `/api/*` surface
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validate the form locally, then submit it. Nothing is sent when
    /// validation fails.
    pub async fn recommend(&self, form: &RecommendForm) -> Result<RecommendResponse, ClientError> {
        let request = form.validate()?;
        let url = format!("{}/api/recommend", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Gateway `/health` body
    pub async fn health(&self) -> Result<Value, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Recent conversation memories, newest first
    pub async fn recent_memories(&self, limit: usize) -> Result<Vec<Value>, ClientError> {
        let url = format!("{}/api/memory/recent", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        Ok(array_field(body, "memories"))
    }
}

/// Turn a non-success status into [`ClientError::Status`], using the
/// `{"error": ...}` body when there is one
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

fn array_field(mut body: Value, field: &str) -> Vec<Value> {
    match body.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[async_trait]
impl LogSource for GatewayClient {
    async fn fetch_tail(&self, limit: usize) -> Result<Vec<Value>, ClientError> {
        let url = format!("{}/api/logs", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        let logs = array_field(body, "logs");
        debug!(count = logs.len(), "Fetched log tail");
        Ok(logs)
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let url = format!("{}/api/logs/clear", self.base_url);
        let response = self.client.post(&url).send().await?;
        check(response).await?;
        Ok(())
    }
}
