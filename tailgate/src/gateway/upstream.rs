//! HTTP client for the backend agent service

use super::GatewayError;
use axum::body::Bytes;
use axum::http::{header, HeaderValue, Method, StatusCode};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

/// A backend response, passed through to the caller as-is
#[derive(Debug)]
pub struct Forwarded {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Reachability of the backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Backend the gateway forwards to
pub struct Upstream {
    client: Client,
    base_url: String,
}

impl Upstream {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Client)?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request to `{base_url}{path}` and capture the raw response.
    ///
    /// Only a failure to get any response at all is an error; backend error
    /// statuses come back as ordinary [`Forwarded`] values.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        content_type: Option<&HeaderValue>,
        body: Bytes,
    ) -> Result<Forwarded, GatewayError> {
        let url = match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        };

        let mut request = self.client.request(method.clone(), &url);
        if let Some(ct) = content_type {
            request = request.header(header::CONTENT_TYPE, ct.clone());
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let start = Instant::now();
        let response = request.send().await.map_err(GatewayError::Unavailable)?;

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(GatewayError::Body)?;

        debug!(
            %method,
            url,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Forwarded request"
        );

        Ok(Forwarded {
            status,
            content_type,
            body,
        })
    }

    /// Probe the backend's `/health` endpoint
    pub async fn health_check(&self) -> HealthStatus {
        let url = format!("{}/health", self.base_url);
        let start = Instant::now();

        match self.client.get(&url).send().await {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthStatus {
                        healthy: true,
                        latency_ms: Some(latency),
                        error: None,
                    }
                } else {
                    HealthStatus {
                        healthy: false,
                        latency_ms: Some(latency),
                        error: Some(format!("HTTP {}", response.status())),
                    }
                }
            }
            Err(e) => HealthStatus {
                healthy: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}
