//! Language model invocation.
//!
//! The engine never runs a model itself. It talks to a function-calling
//! backend through the [`ModelProvider`] trait; [`GeminiProvider`] is the
//! HTTP adapter used by the binaries, and tests script their own providers.

pub mod error;
pub mod gemini;
pub mod message;
pub mod provider;
pub mod sse;

pub use error::LlmError;
pub use gemini::{GeminiConfig, GeminiProvider};
pub use message::{DialogueTurn, Part, Role};
pub use provider::{
    ModelProvider, ModelRequest, ModelResponse, RequestedCall, TextStream, ToolDefinition,
};
