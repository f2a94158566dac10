//! Incremental JSON object extraction.
//!
//! Streaming model responses arrive as arbitrary text fragments that may cut
//! a JSON token anywhere, including inside string literals and between a
//! backslash and the character it escapes. [`ObjectExtractor`] scans the
//! accumulated text once, tracking brace depth and string/escape state, and
//! emits each top-level object the moment its braces balance.
//!
//! A slice that fails to parse is dropped and never retried. If nothing at
//! all was emitted by the end of the stream, the whole raw buffer is handed
//! back as a single fallback payload.

use futures_util::{Stream, StreamExt};
use serde_json::Value;

/// One output of the extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorEvent {
    /// A complete, parsed top-level object.
    Object(Value),
    /// The raw buffer, emitted at end of stream when no object parsed.
    Fallback(String),
    /// End of stream. Always the last event.
    Done,
}

/// Bracket-depth scanner carrying state across fragments.
#[derive(Debug, Default)]
pub struct ObjectExtractor {
    buffer: String,
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    object_start: usize,
    emitted: usize,
}

impl ObjectExtractor {
    /// Create an extractor with empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Feed one fragment, returning every object it completed.
    pub fn push(&mut self, fragment: &str) -> Vec<Value> {
        self.buffer.push_str(fragment);
        let mut objects = Vec::new();
        let mut consumed = 0;

        let start = self.scanned;
        for (offset, ch) in self.buffer[start..].char_indices() {
            let pos = start + offset;
            if self.escaped {
                self.escaped = false;
                continue;
            }
            match ch {
                '\\' => self.escaped = true,
                '"' => self.in_string = !self.in_string,
                _ if self.in_string => {}
                '{' => {
                    if self.depth == 0 {
                        self.object_start = pos;
                    }
                    self.depth += 1;
                }
                '}' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let end = pos + 1;
                        match serde_json::from_str::<Value>(&self.buffer[self.object_start..end]) {
                            Ok(value) => {
                                self.emitted += 1;
                                consumed = end;
                                objects.push(value);
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "discarding unparseable object slice");
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.scanned = self.buffer.len();

        if consumed > 0 {
            self.buffer.drain(..consumed);
            self.scanned -= consumed;
            self.object_start = self.object_start.saturating_sub(consumed);
        }
        objects
    }

    /// End the stream: a fallback (if nothing was emitted) then [`ExtractorEvent::Done`].
    pub fn finish(self) -> Vec<ExtractorEvent> {
        let mut events = Vec::with_capacity(2);
        if self.emitted == 0 {
            events.push(ExtractorEvent::Fallback(self.buffer));
        }
        events.push(ExtractorEvent::Done);
        events
    }
}

/// Run the extractor over a fragment stream.
///
/// Objects are yielded as they complete. A stream error ends extraction
/// early but still produces the end-of-stream events.
pub fn extract_objects<S, E>(fragments: S) -> impl Stream<Item = ExtractorEvent>
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut extractor = ObjectExtractor::new();
        let mut fragments = Box::pin(fragments);
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => {
                    for object in extractor.push(&text) {
                        yield ExtractorEvent::Object(object);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fragment stream failed, finishing early");
                    break;
                }
            }
        }
        tracing::debug!(objects = extractor.emitted(), "fragment stream ended");
        for event in extractor.finish() {
            yield event;
        }
    }
}
