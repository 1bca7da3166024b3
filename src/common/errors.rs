use serde::Deserialize;
use thiserror::Error;

use crate::common::types::{GuildId, NodeKey};

/// Coarse classification of a [`ClientError`], so callers can decide between
/// fixing their input, waiting, or retrying without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unusable configuration; the object was never constructed.
    Configuration,
    /// The node or voice session is not (or no longer) in a usable state.
    NotReady,
    /// Rejected locally before any network call.
    Validation,
    /// Socket or REST failure, including timeouts and backend error bodies.
    Transport,
    /// The guild has no player.
    NotFound,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("node {node} has not received a session id yet")]
    NodeNotReady { node: String },

    #[error("node {node} is closed")]
    NodeClosed { node: String },

    #[error("no node is available")]
    NoNodeAvailable,

    #[error("voice connection for guild {0} is incomplete")]
    IncompleteVoice(GuildId),

    #[error("{0}")]
    Validation(String),

    #[error("no player for guild {0}")]
    PlayerNotFound(GuildId),

    #[error("node {0} is not registered")]
    NodeNotFound(NodeKey),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {path} timed out")]
    Timeout { path: String },

    #[error("node responded {status} on {path}: {message}")]
    Rest {
        status: u16,
        message: String,
        path: String,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("gateway send failed for guild {guild}: {message}")]
    Gateway { guild: GuildId, message: String },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::NodeNotReady { .. }
            | Self::NodeClosed { .. }
            | Self::NoNodeAvailable
            | Self::IncompleteVoice(_) => ErrorKind::NotReady,
            Self::Validation(_) => ErrorKind::Validation,
            Self::PlayerNotFound(_) | Self::NodeNotFound(_) => ErrorKind::NotFound,
            Self::Http(_)
            | Self::Timeout { .. }
            | Self::Rest { .. }
            | Self::WebSocket(_)
            | Self::Decode(_)
            | Self::Gateway { .. } => ErrorKind::Transport,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Lavalink v4 JSON error response body, as returned by a node on failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub timestamp: u64,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Bad Request").
    #[serde(default)]
    pub error: String,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
    /// The request path that caused the error.
    #[serde(default)]
    pub path: String,
    /// Stack trace, only when the node was asked for one.
    #[serde(default)]
    pub trace: Option<String>,
}

impl ErrorResponse {
    pub fn into_error(self, fallback_path: &str) -> ClientError {
        let path = if self.path.is_empty() {
            fallback_path.to_string()
        } else {
            self.path
        };
        let message = if self.message.is_empty() {
            self.error
        } else {
            self.message
        };
        ClientError::Rest {
            status: self.status,
            message,
            path,
        }
    }
}
