//! Event-stream frames for extractor output.
//!
//! Each extracted object becomes one `data: <json>` frame. The fallback blob
//! travels in a reserved single-key object, `{"fallback": "<raw>"}`, so
//! clients can tell it apart from progressive objects. Every stream ends
//! with the literal `data: [DONE]` frame.

use serde_json::Value;

use super::extractor::ExtractorEvent;

/// Key of the reserved fallback payload.
pub const FALLBACK_KEY: &str = "fallback";

/// The sentinel carried by the terminal frame.
pub const DONE_SENTINEL: &str = "[DONE]";

impl ExtractorEvent {
    /// The frame's `data` payload.
    pub fn payload(&self) -> String {
        match self {
            Self::Object(value) => value.to_string(),
            Self::Fallback(raw) => {
                let mut map = serde_json::Map::new();
                map.insert(FALLBACK_KEY.to_string(), Value::String(raw.clone()));
                Value::Object(map).to_string()
            }
            Self::Done => DONE_SENTINEL.to_string(),
        }
    }
}
