use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::overlay::registry::TrackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    RolledBack,
    Refused,
}

/// One JSONL line per stream session.
///
/// Page text never lands in the trace; only a fingerprint of the original
/// content and the size of the reply.
#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub session: u64,
    pub track_id: String,
    pub page_url: String,

    pub outcome: SessionOutcome,
    pub fragments: usize,
    pub reply_chars: usize,

    pub original_fingerprint: Option<String>,
    pub error: Option<String>,
}

impl TraceEvent {
    pub fn now(session: u64, track_id: TrackId, page_url: &str, outcome: SessionOutcome) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            session,
            track_id: track_id.to_string(),
            page_url: page_url.to_string(),
            outcome,
            fragments: 0,
            reply_chars: 0,
            original_fingerprint: None,
            error: None,
        }
    }

    pub fn with_reply(mut self, fragments: usize, reply: &str) -> Self {
        self.fragments = fragments;
        self.reply_chars = reply.chars().count();
        self
    }

    pub fn with_original(mut self, original: &str) -> Self {
        self.original_fingerprint = Some(text_fingerprint(original));
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

pub fn text_fingerprint(text: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
