use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::debug;

use crate::completion::api::{DATA_PREFIX, DONE_SENTINEL, StreamChunk};
use crate::completion::error::{CompletionError, PayloadError};

const READ_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug)]
pub enum SseEvent {
    /// Payload of a `data:` record, prefix stripped
    Data(String),
    /// `data: [DONE]`
    Done,
    /// Line that could not be decoded
    Malformed(PayloadError),
}

/// Splits a chunked byte stream into newline-delimited event records.
///
/// Bytes are held until a full line is available, so records and multi-byte
/// characters split across network chunks survive intact. Lines without the
/// data marker (comments, `event:`, blank keep-alives) are dropped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing record that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.pending);
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = match std::str::from_utf8(raw) {
        Ok(l) => l.trim(),
        Err(_) => return Some(SseEvent::Malformed(PayloadError::Encoding)),
    };

    let payload = line.strip_prefix(DATA_PREFIX)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload).trim();
    if payload == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(payload.to_string()))
}

/// Text delta carried by one record payload; `Ok(None)` when the record has none.
pub fn parse_delta(payload: &str) -> Result<Option<String>, PayloadError> {
    let chunk: StreamChunk = serde_json::from_str(payload).map_err(PayloadError::Json)?;
    Ok(chunk.into_content())
}

/// Iterator of text fragments read from a streamed completion body.
///
/// Payload noise (bad JSON, records without a delta) is skipped; a read
/// failure yields one `CompletionError::Stream` and ends the sequence; the
/// `[DONE]` sentinel or end of body ends it normally.
pub struct Fragments<R> {
    reader: R,
    decoder: SseDecoder,
    queue: VecDeque<SseEvent>,
    buffer: Vec<u8>,
    eof: bool,
    finished: bool,
    skipped: usize,
}

impl<R: Read> Fragments<R> {
    pub fn new(reader: R) -> Self {
        Fragments {
            reader,
            decoder: SseDecoder::new(),
            queue: VecDeque::new(),
            buffer: vec![0; READ_BUFFER_SIZE],
            eof: false,
            finished: false,
            skipped: 0,
        }
    }

    /// Records dropped as payload noise so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn fill(&mut self) -> Result<(), CompletionError> {
        loop {
            match self.reader.read(&mut self.buffer) {
                Ok(0) => {
                    self.eof = true;
                    self.queue.extend(self.decoder.finish());
                    return Ok(());
                }
                Ok(n) => {
                    let events = self.decoder.push(&self.buffer[..n]);
                    self.queue.extend(events);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CompletionError::Stream(e)),
            }
        }
    }
}

impl<R: Read> Iterator for Fragments<R> {
    type Item = Result<String, CompletionError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let Some(event) = self.queue.pop_front() else {
                if self.eof {
                    self.finished = true;
                    break;
                }
                if let Err(e) = self.fill() {
                    self.finished = true;
                    return Some(Err(e));
                }
                continue;
            };

            match event {
                SseEvent::Done => {
                    self.finished = true;
                }
                SseEvent::Data(payload) => match parse_delta(&payload) {
                    Ok(Some(text)) if !text.is_empty() => return Some(Ok(text)),
                    Ok(_) => {}
                    Err(e) => {
                        self.skipped += 1;
                        debug!(error = %e, payload = %payload, "skipping stream record");
                    }
                },
                SseEvent::Malformed(e) => {
                    self.skipped += 1;
                    debug!(error = %e, "skipping stream record");
                }
            }
        }
        None
    }
}
