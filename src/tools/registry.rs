//! Tool registry and dispatcher.
//!
//! The [`ToolRegistry`] maps tool names to handlers, exports their schemas
//! for model requests, and dispatches batches of calls strictly in order.

use std::collections::HashMap;
use std::sync::Arc;

use super::args::ToolInvocation;
use super::types::{ToolCall, ToolHandler, ToolResult};
use crate::agent::session::StagedSlot;
use crate::llm::provider::ToolDefinition;

/// Registry of available tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Replaces any existing handler.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(name.into(), handler);
    }

    /// Register `handler` under its own name.
    pub fn register_handler(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        self.register(name, handler);
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Tool definitions for model requests, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|(name, t)| ToolDefinition::new(name.clone(), t.description(), t.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute `calls` sequentially, returning one result per call in call order.
    ///
    /// Never fails: unknown tools, invalid arguments and handler errors all
    /// become error-text results.
    pub async fn dispatch(&self, calls: &[ToolCall], staged: &mut StagedSlot) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch_one(call, staged).await);
        }
        results
    }

    async fn dispatch_one(&self, call: &ToolCall, staged: &mut StagedSlot) -> ToolResult {
        let Some(handler) = self.get(&call.name) else {
            tracing::warn!(tool_name = %call.name, round = call.round, "model requested unknown tool");
            return ToolResult::failure(
                &call.name,
                format!("unknown tool '{}'. Available: {}", call.name, self.names().join(", ")),
            );
        };

        let invocation = match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(inv) => inv,
            Err(e) => {
                tracing::warn!(tool_name = %call.name, error = %e, "tool arguments rejected");
                return ToolResult::failure(&call.name, e);
            }
        };

        match handler.execute(invocation, staged).await {
            Ok(text) => {
                tracing::debug!(tool_name = %call.name, round = call.round, "tool succeeded");
                ToolResult::success(&call.name, text)
            }
            Err(e) => {
                tracing::warn!(tool_name = %call.name, round = call.round, error = %e, "tool failed");
                ToolResult::failure(&call.name, e)
            }
        }
    }
}
