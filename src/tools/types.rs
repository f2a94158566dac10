//! Core tool types.
//!
//! Defines the [`ToolHandler`] trait every tool implements, the
//! [`ToolCall`]/[`ToolResult`] pair the dispatcher produces, and
//! [`ToolError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::args::{ToolArgError, ToolInvocation};
use crate::agent::session::StagedSlot;
use crate::store::StoreError;

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Raw arguments as sent by the model.
    pub arguments: serde_json::Value,
    /// 1-based round within the current user message.
    pub round: u32,
}

/// Text result of one call, paired positionally with its [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool name the result belongs to.
    pub name: String,
    /// Text fed back to the model.
    pub text: String,
    /// Whether the text reports a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            is_error: false,
        }
    }

    /// A failed result. The text is prefixed with `Error: `.
    pub fn failure(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            name: name.into(),
            text: format!("Error: {error}"),
            is_error: true,
        }
    }
}

/// Failures a tool reports. The dispatcher turns every one into result text.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments failed validation.
    #[error(transparent)]
    InvalidArgs(#[from] ToolArgError),

    /// The record store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Commit was requested with no draft staged.
    #[error("no item is staged; call stage_item with the item details before commit_item")]
    NothingStaged,

    /// The handler received an invocation meant for another tool.
    #[error("{handler} cannot handle a {invocation} request")]
    Mismatch {
        /// Handler name.
        handler: String,
        /// Invocation tool name.
        invocation: String,
    },

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Build a [`ToolError::Mismatch`].
    pub fn mismatch(handler: &str, invocation: &ToolInvocation) -> Self {
        Self::Mismatch {
            handler: handler.to_string(),
            invocation: invocation.tool_name().to_string(),
        }
    }
}

/// Core trait for tools.
///
/// Handlers receive an already-validated [`ToolInvocation`] and the session's
/// staged-draft slot, and return the text the model will see.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool name as exposed to the model.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn schema(&self) -> serde_json::Value;

    /// Run the tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`]; the dispatcher reports it as result text.
    async fn execute(
        &self,
        invocation: ToolInvocation,
        staged: &mut StagedSlot,
    ) -> Result<String, ToolError>;
}
