//! Model provider trait.
//!
//! Defines the [`ModelProvider`] trait that every function-calling model
//! backend satisfies, plus the request/response shapes exchanged with it.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::message::DialogueTurn;

/// A tool definition provided to the model for function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"query_items"`).
    pub name: String,
    /// Human-readable description of the tool's purpose.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A single model invocation.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered turn list.
    pub turns: Vec<DialogueTurn>,
    /// Optional system instruction.
    pub system_instruction: Option<String>,
    /// Tool schema offered to the model.
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Create a request for `model` over `turns`.
    pub fn new(model: impl Into<String>, turns: Vec<DialogueTurn>) -> Self {
        Self {
            model: model.into(),
            turns,
            system_instruction: None,
            tools: Vec::new(),
        }
    }

    /// Set the system instruction.
    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    /// Attach tool definitions.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedCall {
    /// Function name.
    pub name: String,
    /// Structured arguments.
    pub args: serde_json::Value,
}

/// A complete (non-streamed) model response.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    /// Final text (may be empty when the model only requested calls).
    pub text: String,
    /// Function calls, in the order the model listed them.
    pub tool_calls: Vec<RequestedCall>,
    /// The model turn exactly as it must be echoed back in the next request.
    /// Present whenever `tool_calls` came from a provider that supports echo.
    pub echo: Option<DialogueTurn>,
}

impl ModelResponse {
    /// A text-only response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            echo: None,
        }
    }

    /// Whether the model asked for at least one function call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A boxed stream of text fragments from a streaming model response.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Trait for model provider adapters.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the provider name (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Invoke the model and wait for the whole response.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError>;

    /// Invoke the model and receive the text incrementally.
    ///
    /// The default implementation forwards to [`generate`](Self::generate)
    /// and yields its text as a single fragment.
    async fn stream_text(&self, request: &ModelRequest) -> Result<TextStream, LlmError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(response.text)])))
    }
}
