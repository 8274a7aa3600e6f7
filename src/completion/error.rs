use thiserror::Error;

/// Failures that end a completion request.
///
/// `Config` is raised before any network traffic. `Status`, `Network` and
/// `Stream` are transport failures: fatal for the session, never retried.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// API key or model missing
    #[error("{0} is not configured")]
    Config(String),

    /// Endpoint answered with a non-success status
    #[error("completion request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request could not be sent or the client could not be built
    #[error("completion request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// Response body broke off mid-stream
    #[error("completion stream interrupted: {0}")]
    Stream(#[source] std::io::Error),
}

impl CompletionError {
    pub fn is_config(&self) -> bool {
        matches!(self, CompletionError::Config(_))
    }

    pub fn is_transport(&self) -> bool {
        !self.is_config()
    }
}

/// A single unusable stream record. Logged and skipped, never fatal.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("record is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("record is not valid UTF-8")]
    Encoding,
}
