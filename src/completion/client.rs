use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::time::Duration;

use tracing::{debug, warn};

use crate::completion::api::{ChatRequest, DEFAULT_ENDPOINT};
use crate::completion::error::CompletionError;
use crate::completion::sse::Fragments;

/// Incremental text fragments of one completion, in arrival order.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String, CompletionError>>>;

pub trait CompletionBackend {
    fn stream_completion(&self, api_key: &str, model: &str, prompt: &str) -> Result<FragmentStream, CompletionError>;
}

/// Reject a request before any traffic when credentials are missing.
pub fn check_credentials(api_key: &str, model: &str) -> Result<(), CompletionError> {
    if api_key.trim().is_empty() {
        return Err(CompletionError::Config("API key".into()));
    }
    if model.trim().is_empty() {
        return Err(CompletionError::Config("model".into()));
    }
    Ok(())
}

// ============================================================================
// HTTP backend
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint: String,
    pub connect_timeout: Duration,
    /// Whole-request limit; `None` lets long streams run to completion
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

pub struct CompletionClient {
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl CompletionClient {
    pub fn new(options: ClientOptions) -> Result<Self, CompletionError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(CompletionError::Network)?;

        Ok(CompletionClient {
            endpoint: options.endpoint,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionBackend for CompletionClient {
    fn stream_completion(&self, api_key: &str, model: &str, prompt: &str) -> Result<FragmentStream, CompletionError> {
        check_credentials(api_key, model)?;

        let request = ChatRequest::streaming_user_prompt(model, prompt);
        debug!(endpoint = %self.endpoint, model, prompt_chars = prompt.chars().count(), "sending completion request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .map_err(CompletionError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "completion endpoint rejected request");
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::new(Fragments::new(response)))
    }
}

// ============================================================================
// Replay backend (recorded bodies, no network)
// ============================================================================

/// Serves a recorded response body, chunk by chunk, through the same decoder
/// as the HTTP backend. Optionally fails after the recorded chunks, or
/// refuses the request outright with a status.
#[derive(Debug, Clone, Default)]
pub struct ReplayBackend {
    chunks: Vec<Vec<u8>>,
    fail_after: bool,
    status: Option<u16>,
}

impl ReplayBackend {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        ReplayBackend {
            chunks: chunks.into_iter().map(Into::into).collect(),
            fail_after: false,
            status: None,
        }
    }

    /// Break the stream with a read error once the recorded chunks are consumed.
    pub fn failing_after_chunks(mut self) -> Self {
        self.fail_after = true;
        self
    }

    /// Answer with an HTTP error status instead of a body.
    pub fn rejecting(status: u16) -> Self {
        ReplayBackend {
            status: Some(status),
            ..Default::default()
        }
    }
}

impl CompletionBackend for ReplayBackend {
    fn stream_completion(&self, api_key: &str, model: &str, _prompt: &str) -> Result<FragmentStream, CompletionError> {
        check_credentials(api_key, model)?;
        if let Some(status) = self.status {
            return Err(CompletionError::Status {
                status,
                body: String::new(),
            });
        }
        let reader = ChunkedReader {
            chunks: self.chunks.iter().cloned().map(Cursor::new).collect(),
            fail_after: self.fail_after,
        };
        Ok(Box::new(Fragments::new(reader)))
    }
}

/// Yields each chunk in its own `read` call, like a network body would.
struct ChunkedReader {
    chunks: VecDeque<Cursor<Vec<u8>>>,
    fail_after: bool,
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while let Some(front) = self.chunks.front_mut() {
            let n = front.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.chunks.pop_front();
        }
        if self.fail_after {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        Ok(0)
    }
}
