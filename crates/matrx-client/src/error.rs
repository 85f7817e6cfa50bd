use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Engine unavailable: no endpoint has been discovered")]
    EngineUnavailable,

    #[error("Request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket not connected")]
    NotConnected,

    #[error("Tool '{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("Engine error: {0}")]
    Remote(String),

    #[error("Session closed")]
    Closed,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No user id configured; document routes require X-User-Id")]
    MissingUserId,

    #[error("Aborted")]
    Aborted,
}

impl ClientError {
    /// Short stable code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::EngineUnavailable => "engine_unavailable",
            ClientError::Http { .. } => "http_status",
            ClientError::Transport(_) => "transport",
            ClientError::NotConnected => "not_connected",
            ClientError::Timeout { .. } => "timeout",
            ClientError::Remote(_) => "remote",
            ClientError::Closed => "closed",
            ClientError::Decode(_) => "decode",
            ClientError::MissingUserId => "missing_user_id",
            ClientError::Aborted => "aborted",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
