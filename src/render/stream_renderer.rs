use thiserror::Error;
use tracing::warn;

use crate::completion::error::CompletionError;
use crate::dom::dom_model::Document;
use crate::dom::error::DomError;
use crate::dom::text_carrier::TextCarrier;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Target element vanished while the reply was being written
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// State of one activation: the rollback snapshot and the accumulated reply.
#[derive(Debug)]
pub struct StreamSession {
    original: String,
    buffer: String,
    fragments: usize,
}

impl StreamSession {
    /// Capture the target's current text as the rollback state.
    pub fn begin(doc: &Document, target: &dyn TextCarrier) -> Self {
        StreamSession {
            original: target.read(doc),
            buffer: String::new(),
            fragments: 0,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Append to the buffer, then assign the whole buffer to the target.
    pub fn apply(&mut self, doc: &mut Document, target: &dyn TextCarrier, fragment: &str) -> Result<(), DomError> {
        if fragment.is_empty() {
            return Ok(());
        }
        self.buffer.push_str(fragment);
        self.fragments += 1;
        target.write(doc, &self.buffer)?;
        target.scroll_to_end(doc)
    }

    pub fn rollback(&self, doc: &mut Document, target: &dyn TextCarrier) {
        if let Err(e) = target.write(doc, &self.original) {
            warn!(error = %e, "could not restore original text");
        }
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

/// Stream `fragments` into `target`.
///
/// Either the whole sequence is rendered, or the target ends with exactly the
/// text it had before the call and the error is returned.
pub fn render<I>(fragments: I, doc: &mut Document, target: &dyn TextCarrier) -> Result<String, RenderError>
where
    I: IntoIterator<Item = Result<String, CompletionError>>,
{
    let mut session = StreamSession::begin(doc, target);
    target.write(doc, "")?;

    for fragment in fragments {
        let applied = fragment
            .map_err(RenderError::from)
            .and_then(|text| session.apply(doc, target, &text).map_err(RenderError::from));
        if let Err(e) = applied {
            session.rollback(doc, target);
            return Err(e);
        }
    }

    Ok(session.finish())
}
