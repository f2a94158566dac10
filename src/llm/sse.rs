//! Server-Sent Events (SSE) framing.
//!
//! Parses the `data:` event frames that streaming model endpoints emit.
//!
//! # SSE Format
//!
//! ```text
//! data: {"key": "value"}
//!
//! data: [DONE]
//! ```

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). `None` if not specified.
    pub event_type: Option<String>,
    /// The data payload. Multiple data lines are joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        event
    }

    /// Returns an event when a blank line closes one that carried data.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.has_data().then(|| self.build());
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event_type = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

/// Incrementally parse SSE bytes, yielding events as they become complete.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseLineParser {
    pending: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    /// Create a new incremental SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning any events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any remaining buffered data as a final event.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.builder.process_line(line);
        }
        self.builder.has_data().then(|| self.builder.build())
    }
}
