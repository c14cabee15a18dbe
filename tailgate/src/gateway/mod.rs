//! Gateway: pass-through proxy in front of the backend agent service
//!
//! Every `/api/*` route forwards to the matching backend route. Backend status
//! codes and bodies are returned untouched; a generic error body is produced
//! only when the backend cannot be reached at all.

mod upstream;

pub use upstream::{Forwarded, HealthStatus, Upstream};

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Message returned when the backend is unreachable
pub const UNAVAILABLE_MESSAGE: &str = "Failed to connect to recommendation service";

/// Errors produced by the gateway itself
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to connect to recommendation service")]
    Unavailable(#[source] reqwest::Error),

    #[error("Invalid response from recommendation service")]
    Body(#[source] reqwest::Error),

    #[error("HTTP client setup failed: {0}")]
    Client(reqwest::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Unavailable(cause) => {
                error!(error = %cause, "Backend unreachable");
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Body(cause) => {
                error!(error = %cause, "Backend response could not be read");
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Client(cause) => {
                error!(error = %cause, "Gateway HTTP client error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl IntoResponse for Forwarded {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(ct) = self.content_type {
            headers.insert(header::CONTENT_TYPE, ct);
        }
        (self.status, headers, self.body).into_response()
    }
}

/// Gateway state
pub struct GatewayState {
    pub upstream: Upstream,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub backend: String,
    pub backend_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
}

/// Create the gateway router
pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/recommend", post(recommend))
        .route("/api/logs", get(logs))
        .route("/api/logs/clear", post(clear_logs))
        .route("/api/memory/recent", get(recent_memories))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let backend = state.upstream.health_check().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "tailgate-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.upstream.base_url().to_string(),
        backend_healthy: backend.healthy,
        backend_latency_ms: backend.latency_ms,
        backend_error: backend.error,
    })
}

async fn recommend(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Forwarded, GatewayError> {
    state
        .upstream
        .forward(
            Method::POST,
            "/recommend",
            None,
            headers.get(header::CONTENT_TYPE),
            body,
        )
        .await
}

async fn logs(
    State(state): State<Arc<GatewayState>>,
    RawQuery(query): RawQuery,
) -> Result<Forwarded, GatewayError> {
    state
        .upstream
        .forward(Method::GET, "/logs", query.as_deref(), None, Bytes::new())
        .await
}

async fn clear_logs(State(state): State<Arc<GatewayState>>) -> Result<Forwarded, GatewayError> {
    state
        .upstream
        .forward(Method::POST, "/logs/clear", None, None, Bytes::new())
        .await
}

async fn recent_memories(
    State(state): State<Arc<GatewayState>>,
    RawQuery(query): RawQuery,
) -> Result<Forwarded, GatewayError> {
    state
        .upstream
        .forward(Method::GET, "/memory/recent", query.as_deref(), None, Bytes::new())
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::tests::spawn_backend;
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::time::Duration;

    pub(crate) async fn spawn_gateway(backend_url: String) -> SocketAddr {
        let upstream = Upstream::new(backend_url, Duration::from_secs(5)).unwrap();
        let app = create_router(Arc::new(GatewayState { upstream }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// An address nothing listens on
    async fn dead_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_logs_are_forwarded_with_query() {
        let (backend, logs) = spawn_backend().await;
        for i in 0..5 {
            logs.info(format!("event {i}"));
        }
        let gateway = spawn_gateway(format!("http://{backend}")).await;

        let body: Value = reqwest::get(format!("http://{gateway}/api/logs?limit=2"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["count"], 2);
        assert_eq!(body["logs"][1]["message"], "event 4");
    }

    #[tokio::test]
    async fn test_clear_is_forwarded() {
        let (backend, logs) = spawn_backend().await;
        logs.info("doomed");
        let gateway = spawn_gateway(format!("http://{backend}")).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{gateway}/api/logs/clear"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_passes_through_unmodified() {
        let (backend, _logs) = spawn_backend().await;
        let gateway = spawn_gateway(format!("http://{backend}")).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{gateway}/api/recommend"))
            .json(&json!({"mood": "", "activity": "walk"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Mood and activity are required."}));
    }

    #[tokio::test]
    async fn test_recommend_success_is_forwarded() {
        let (backend, _logs) = spawn_backend().await;
        let gateway = spawn_gateway(format!("http://{backend}")).await;

        let body: Value = reqwest::Client::new()
            .post(format!("http://{gateway}/api/recommend"))
            .json(&json!({"mood": "calm", "activity": "study"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert!(body["recommendations"].as_array().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_503() {
        let gateway = spawn_gateway(dead_address().await).await;

        let resp = reqwest::get(format!("http://{gateway}/api/logs"))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_health_reports_gateway_identity() {
        let gateway = spawn_gateway(dead_address().await).await;
        let body: Value = reqwest::get(format!("http://{gateway}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["service"], "tailgate-gateway");
        assert_eq!(body["backend_healthy"], false);
        assert!(body.get("backend_latency_ms").is_none());
        assert!(body["backend_error"].is_string());
    }

    #[tokio::test]
    async fn test_health_reports_backend_latency() {
        let (backend, _logs) = spawn_backend().await;
        let gateway = spawn_gateway(format!("http://{backend}")).await;
        let body: Value = reqwest::get(format!("http://{gateway}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["backend_healthy"], true);
        assert!(body["backend_latency_ms"].is_u64());
        assert!(body.get("backend_error").is_none());
    }
}
