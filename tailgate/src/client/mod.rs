//! Client side of the log panel
//!
//! - [`LogSource`]: where log tails come from (the gateway in production)
//! - [`view`]: pure rendering of a fetched tail against scroll geometry
//! - [`LogTailClient`]: the polling state machine driving the panel
//! - [`RecommendForm`]: local validation before anything is sent

mod form;
mod http;
mod tail;
pub mod view;

pub use form::{RecommendForm, ValidationError};
pub use http::GatewayClient;
pub use tail::{Frame, LogTailClient, PanelState, TailOptions};
pub use view::{render, DisplayEntry, DisplayLevel, RenderedLog, ViewState};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from talking to the gateway
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Something that can serve the tail of the backend log
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch up to `limit` trailing entries as raw JSON, oldest first
    async fn fetch_tail(&self, limit: usize) -> Result<Vec<Value>, ClientError>;

    /// Ask the server to drop every entry
    async fn clear(&self) -> Result<(), ClientError>;
}
