//! Error taxonomy for the chat core.

use std::path::PathBuf;

/// Errors raised while loading the index or running a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The persisted index is missing or corrupt. Fatal at startup.
    #[error("failed to load index from {path:?}: {reason}")]
    IndexLoad { path: PathBuf, reason: String },

    /// Transport failure reaching the hosted model.
    #[error("model request failed: {0}")]
    ModelRequest(String),

    /// The hosted model refused the call with a non-success HTTP status. The
    /// body is kept for logs only.
    #[error("OpenAI API error {status}")]
    ModelStatus { status: u16, body: String },

    /// The hosted model answered with something unusable.
    #[error("malformed model response: {0}")]
    ModelResponse(String),

    #[error("message cannot be empty")]
    EmptyInput,

    #[error("still waiting for a reply to the previous message")]
    ResponsePending,

    #[error("no OpenAI API key configured (set OPENAI_API_KEY or openai_api_key in the config file)")]
    MissingApiKey,

    #[error("configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub fn index_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        ChatError::IndexLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failed turn can be dispatched again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::ModelRequest(_) | ChatError::ModelResponse(_) => true,
            ChatError::ModelStatus { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

/// Statuses where sending the same request again can succeed. Any other 4xx
/// means the request itself is rejected.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 401 | 408 | 429) || status >= 500
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChatError::ModelResponse(err.to_string())
        } else {
            ChatError::ModelRequest(err.to_string())
        }
    }
}
