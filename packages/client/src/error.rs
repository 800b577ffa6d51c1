use std::time::Duration;

use thiserror::Error;

/// Errors produced by the client.
///
/// Only `Protocol`, `NotFound`, `Http` and `Config` ever reach callers of the
/// resource facade. `Transport`, `Framing` and `StaleConnection` are absorbed
/// inside a live session and only show up in logs and session status.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Protocol error ({status}): {message}")]
    Protocol { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection stale: no pong for {0:?}")]
    StaleConnection(Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Message handed to error callbacks.
    ///
    /// Server-provided error bodies are passed through verbatim so callers see
    /// exactly what the service said.
    pub fn callback_message(&self) -> String {
        match self {
            Self::Protocol { message, .. } | Self::NotFound(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
