//! Dialogue turn types.
//!
//! Provides the [`DialogueTurn`], [`Role`], and [`Part`] types used to
//! represent conversation history sent to model providers.
//!
//! # Examples
//!
//! ```
//! use colloquy::llm::message::{DialogueTurn, Role};
//!
//! let turn = DialogueTurn::user_text("What's in stock?");
//! assert_eq!(turn.role, Role::User);
//! assert_eq!(turn.text(), "What's in stock?");
//! ```

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// The role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input.
    User,
    /// Model output (text or function calls).
    Model,
    /// Function-call results fed back to the model.
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
            Self::Function => write!(f, "function"),
        }
    }
}

/// One ordered element of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Inline binary content such as an image, base64-encoded.
    InlineData {
        /// MIME type, e.g. `image/jpeg`.
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },
    /// A function call requested by the model.
    FunctionCall {
        /// Function name.
        name: String,
        /// Structured arguments.
        args: serde_json::Value,
    },
    /// The result of a function call.
    FunctionResponse {
        /// Function name the result belongs to.
        name: String,
        /// Structured response body.
        response: serde_json::Value,
    },
}

/// A role-tagged entry in the dialogue history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// Who produced this turn.
    pub role: Role,
    /// Ordered parts.
    pub parts: Vec<Part>,
    /// Verbatim provider payload for this turn. Model turns that requested
    /// function calls keep it so the next request can echo it unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl DialogueTurn {
    /// Create a turn with the given role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            raw: None,
        }
    }

    /// Create a user turn holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text { text: text.into() }])
    }

    /// Create a user turn with text and an attached binary payload (e.g. a photo).
    pub fn user_with_inline(
        text: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::new(
            Role::User,
            vec![
                Part::Text { text: text.into() },
                Part::InlineData {
                    mime_type: mime_type.into(),
                    data,
                },
            ],
        )
    }

    /// Create a model turn holding a single text part.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::Text { text: text.into() }])
    }

    /// Create a function turn carrying one response part per `(name, result)` pair.
    pub fn function_results<'a>(results: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let parts = results
            .into_iter()
            .map(|(name, text)| Part::FunctionResponse {
                name: name.to_string(),
                response: serde_json::json!({ "result": text }),
            })
            .collect();
        Self::new(Role::Function, parts)
    }

    /// Attach the verbatim provider payload.
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Function calls in part order as `(name, args)`.
    pub fn function_calls(&self) -> Vec<(&str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall { name, args } => Some((name.as_str(), args)),
                _ => None,
            })
            .collect()
    }

    /// Whether this is a user-role turn.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Model.to_string(), "model");
        assert_eq!(Role::Function.to_string(), "function");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Function).unwrap(), "\"function\"");
    }

    #[test]
    fn user_with_inline_encodes_base64() {
        let turn = DialogueTurn::user_with_inline("look", "image/png", b"abc");
        assert_eq!(turn.parts.len(), 2);
        match &turn.parts[1] {
            Part::InlineData { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, "YWJj");
            }
            other => panic!("expected inline data, got {other:?}"),
        }
    }

    #[test]
    fn text_joins_text_parts_only() {
        let turn = DialogueTurn::new(
            Role::Model,
            vec![
                Part::Text {
                    text: "Checking ".into(),
                },
                Part::FunctionCall {
                    name: "query_items".into(),
                    args: serde_json::json!({}),
                },
                Part::Text {
                    text: "now.".into(),
                },
            ],
        );
        assert_eq!(turn.text(), "Checking now.");
        assert_eq!(turn.function_calls().len(), 1);
        assert_eq!(turn.function_calls()[0].0, "query_items");
    }

    #[test]
    fn function_results_keep_order() {
        let turn = DialogueTurn::function_results([("a", "one"), ("b", "two")]);
        assert_eq!(turn.role, Role::Function);
        let names: Vec<_> = turn
            .parts
            .iter()
            .map(|p| match p {
                Part::FunctionResponse { name, .. } => name.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn raw_is_skipped_when_absent() {
        let json = serde_json::to_value(DialogueTurn::user_text("hi")).unwrap();
        assert!(json.get("raw").is_none());
        let with_raw = DialogueTurn::model_text("x").with_raw(serde_json::json!({"role": "model"}));
        let json = serde_json::to_value(with_raw).unwrap();
        assert_eq!(json["raw"]["role"], "model");
    }
}
