//! REST API for the backend agent service

use crate::agent::{RecommendError, RecommendRequest, RecommendResponse, RecommendationAgent};
use crate::log_store::{parse_limit, LogEntry, LogStore, DEFAULT_TAIL_LIMIT};
use crate::memory::{Memory, DEFAULT_RECENT_LIMIT};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// API state
pub struct ApiState {
    pub agent: RecommendationAgent,
    pub logs: Arc<LogStore>,
    /// Tail size used when a request has no usable `limit`
    pub default_tail_limit: usize,
}

impl ApiState {
    pub fn new(agent: RecommendationAgent, logs: Arc<LogStore>) -> Self {
        Self {
            agent,
            logs,
            default_tail_limit: DEFAULT_TAIL_LIMIT,
        }
    }
}

/// `?limit=N`; kept as text so bad values fall back to the default instead of a 400
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MemoriesResponse {
    pub memories: Vec<Memory>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub log_entries: usize,
}

/// Error body shared by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Failures of `POST /recommend`, all rendered as [`ErrorBody`]
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("Invalid request body: {0}")]
    Body(#[from] JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Recommend(RecommendError::MissingFields) => StatusCode::BAD_REQUEST,
            ApiError::Recommend(RecommendError::Recommender(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Body(rejection) => rejection.status(),
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommend", post(recommend))
        .route("/logs", get(get_logs))
        .route("/logs/clear", post(clear_logs))
        .route("/memory/recent", get(recent_memories))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "tailgate-backend".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        log_entries: state.logs.len(),
    })
}

/// Run a recommendation request
async fn recommend(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            let err = ApiError::from(rejection);
            error!(error = %err, "Rejected recommendation request");
            state.logs.error(err.to_string());
            return Err(err);
        }
    };

    match state.agent.process(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!(error = %e, "Recommendation request failed");
            Err(e.into())
        }
    }
}

/// Trailing window of the event log
async fn get_logs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LimitQuery>,
) -> Json<LogsResponse> {
    let limit = parse_limit(query.limit.as_deref(), state.default_tail_limit);
    let logs = state.logs.tail(limit);
    Json(LogsResponse {
        count: logs.len(),
        logs,
    })
}

async fn clear_logs(State(state): State<Arc<ApiState>>) -> Json<ClearResponse> {
    state.logs.clear();
    Json(ClearResponse {
        success: true,
        message: "Logs cleared".to_string(),
    })
}

async fn recent_memories(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LimitQuery>,
) -> Json<MemoriesResponse> {
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_RECENT_LIMIT);
    Json(MemoriesResponse {
        memories: state.agent.memory().recent(limit),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agent::CatalogRecommender;
    use crate::log_store::LogLevel;
    use crate::memory::MemoryStore;
    use serde_json::{json, Value};
    use std::net::SocketAddr;

    /// Serve a fresh backend on an ephemeral port
    pub(crate) async fn spawn_backend() -> (SocketAddr, Arc<LogStore>) {
        let logs = Arc::new(LogStore::new());
        let agent = RecommendationAgent::new(
            Arc::new(CatalogRecommender::default()),
            Arc::clone(&logs),
            Arc::new(MemoryStore::new()),
        );
        let app = create_router(Arc::new(ApiState::new(agent, Arc::clone(&logs))));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, logs)
    }

    #[tokio::test]
    async fn test_logs_endpoint_limit_handling() {
        let (addr, logs) = spawn_backend().await;
        for i in 0..150 {
            logs.info(format!("event {i}"));
        }
        let client = reqwest::Client::new();

        let body: LogsResponse = client
            .get(format!("http://{addr}/logs?limit=2"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.count, 2);
        assert_eq!(body.logs[1].message, "event 149");

        for query in ["", "?limit=abc", "?limit=0", "?limit=-4"] {
            let body: LogsResponse = client
                .get(format!("http://{addr}/logs{query}"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(body.count, 100, "query {query:?}");
            assert_eq!(body.logs[0].message, "event 50");
        }
    }

    #[tokio::test]
    async fn test_clear_endpoint_leaves_empty_tail() {
        let (addr, logs) = spawn_backend().await;
        logs.info("before clear");
        let client = reqwest::Client::new();

        for _ in 0..2 {
            let ack: ClearResponse = client
                .post(format!("http://{addr}/logs/clear"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert!(ack.success);
        }

        let body: LogsResponse = client
            .get(format!("http://{addr}/logs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.count, 0);
    }

    #[tokio::test]
    async fn test_recommend_validation_error() {
        let (addr, _logs) = spawn_backend().await;
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/recommend"))
            .json(&json!({"mood": "", "activity": "run"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "Mood and activity are required.");
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_json_errors() {
        let (addr, logs) = spawn_backend().await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/recommend");

        // null is treated like a missing field
        let resp = client
            .post(&url)
            .json(&json!({"mood": null, "activity": "run"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "Mood and activity are required.");

        let resp = client
            .post(&url)
            .json(&json!({"mood": "happy", "activity": "run", "tags": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(resp.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        let body: ErrorBody = resp.json().await.unwrap();
        assert!(body.error.starts_with("Invalid request body"));

        let resp = client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorBody = resp.json().await.unwrap();
        assert!(body.error.starts_with("Invalid request body"));

        let resp = client.post(&url).body("mood=happy").send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(resp.json::<ErrorBody>().await.is_ok());

        let errors = logs
            .tail(100)
            .into_iter()
            .filter(|e| e.level == LogLevel::Error)
            .count();
        assert!(errors >= 3);
    }

    #[tokio::test]
    async fn test_recommend_then_memory_and_logs() {
        let (addr, logs) = spawn_backend().await;
        let client = reqwest::Client::new();

        let resp: RecommendResponse = client
            .post(format!("http://{addr}/recommend"))
            .json(&json!({"mood": "happy", "activity": "party", "tags": "funk pop"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.recommendations[0].song, "Uptown Funk");
        assert!(logs.len() > 3);

        let memories: Value = client
            .get(format!("http://{addr}/memory/recent"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(memories["memories"][0]["id"], json!(resp.memory_id));
    }

    #[tokio::test]
    async fn test_health_reports_identity() {
        let (addr, logs) = spawn_backend().await;
        logs.info("one");
        let body: Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "tailgate-backend");
        assert_eq!(body["log_entries"], 1);
    }
}
