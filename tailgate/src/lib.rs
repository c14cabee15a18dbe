//! tailgate - recommendation gateway with a live backend log tail
//!
//! This crate provides:
//! - An ordered, clearable event log that backend processing writes to
//! - The backend agent REST API (`/recommend`, `/logs`, `/logs/clear`, ...)
//! - A pass-through gateway in front of the backend
//! - A polling log-panel client that keeps the user's scroll position

pub mod agent;
pub mod api;
pub mod client;
pub mod gateway;
pub mod log_store;
pub mod memory;

pub use client::{LogSource, LogTailClient};
pub use log_store::{LogEntry, LogLevel, LogStore};

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Configuration for all three binaries
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TailgateConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

impl TailgateConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `TAILGATE_BACKEND_URL` / `TAILGATE_GATEWAY_URL` when set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("TAILGATE_BACKEND_URL") {
            self.gateway.backend_url = url;
        }
        if let Ok(url) = std::env::var("TAILGATE_GATEWAY_URL") {
            self.client.gateway_url = url;
        }
        self
    }
}

/// Backend agent service settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackendConfig {
    /// Address to listen on
    #[serde(default = "default_backend_bind")]
    pub bind: String,

    /// Entries returned by `/logs` without a usable `limit`
    #[serde(default = "default_tail_limit")]
    pub default_tail_limit: usize,

    /// Optional retention cap; unbounded when absent
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Optional JSON-lines mirror of the event log
    #[serde(default)]
    pub journal_path: Option<String>,

    /// Recommendations returned per request
    #[serde(default = "default_recommendations")]
    pub recommendations: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind: default_backend_bind(),
            default_tail_limit: default_tail_limit(),
            max_entries: None,
            journal_path: None,
            recommendations: default_recommendations(),
        }
    }
}

/// Gateway settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Base URL of the backend agent service
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_gateway_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            backend_url: default_backend_url(),
            request_timeout_secs: default_gateway_timeout(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Log panel client settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_tail_limit")]
    pub tail_limit: usize,

    /// Distance from the bottom that still counts as "at bottom"
    #[serde(default = "default_bottom_threshold")]
    pub bottom_threshold: u32,

    #[serde(default = "default_line_height")]
    pub line_height: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_client_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            poll_interval_ms: default_poll_interval_ms(),
            tail_limit: default_tail_limit(),
            bottom_threshold: default_bottom_threshold(),
            line_height: default_line_height(),
            viewport_height: default_viewport_height(),
            request_timeout_secs: default_client_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn tail_options(&self) -> client::TailOptions {
        client::TailOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            limit: self.tail_limit.max(1),
        }
    }

    pub fn view_state(&self) -> client::ViewState {
        client::ViewState::new(self.viewport_height)
            .with_line_height(self.line_height)
            .with_bottom_threshold(self.bottom_threshold)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_backend_bind() -> String { "0.0.0.0:5001".to_string() }
fn default_gateway_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_backend_url() -> String { "http://localhost:5001".to_string() }
fn default_gateway_url() -> String { "http://localhost:3000".to_string() }
fn default_tail_limit() -> usize { log_store::DEFAULT_TAIL_LIMIT }
fn default_recommendations() -> usize { 3 }
fn default_gateway_timeout() -> u64 { 120 }
fn default_client_timeout() -> u64 { 10 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_bottom_threshold() -> u32 { client::view::DEFAULT_BOTTOM_THRESHOLD }
fn default_line_height() -> u32 { client::view::DEFAULT_LINE_HEIGHT }
fn default_viewport_height() -> u32 { 400 }
