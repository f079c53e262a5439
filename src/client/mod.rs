//! Terminal client side: HTTP API access, persisted state and the live feed.

mod api;
mod live;
mod state;

pub use api::ApiClient;
pub use live::{live_url, LiveStream};
pub use state::{ClientState, ServerTranslator};

use crate::translate::TranslateError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api { error: String, message: String },
    #[error("Not logged in. Run 'shoplist login' first.")]
    NotLoggedIn,
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("Timed out waiting for sign-in")]
    Timeout,
    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid state file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

impl ClientError {
    /// The server's error code, for API errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}
