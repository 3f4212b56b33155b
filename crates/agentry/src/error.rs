use thiserror::Error;

/// Error types that can occur when interacting with a model provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LlmError {
    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication and authorization errors
    #[error("auth error: {0}")]
    Auth(String),

    /// Invalid request parameters or format
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Errors returned by the provider itself
    #[error("provider error: {0}")]
    Provider(String),

    /// The stream ended in a malformed or unexpected way
    #[error("stream error: {0}")]
    Stream(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Tool configuration error
    #[error("tool configuration error: {0}")]
    ToolConfig(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Json(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}
