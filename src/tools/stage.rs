//! Draft an item for later commit.

use async_trait::async_trait;
use serde_json::json;

use super::args::{COMMIT_TOOL, STAGE_TOOL, StageArgs, ToolInvocation};
use super::types::{ToolError, ToolHandler};
use crate::agent::session::{StagedEntity, StagedSlot};

/// The `stage_item` tool.
///
/// Overwrites any existing draft unconditionally and answers with an
/// instruction for the model rather than a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTool;

impl StageTool {
    fn stage(args: StageArgs, staged: &mut StagedSlot) -> String {
        let fields = args.to_fields();
        let details: Vec<String> = fields
            .iter()
            .filter(|(k, _)| k.as_str() != "name")
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        let name = args.name.clone();
        let replaced = staged.stage(StagedEntity::new(args));

        let mut text = format!("Staged draft \"{name}\"");
        if !details.is_empty() {
            text.push_str(&format!(" ({})", details.join(", ")));
        }
        text.push('.');
        if let Some(previous) = replaced {
            text.push_str(&format!(" It replaces the earlier draft \"{}\".", previous.name()));
        }
        text.push_str(&format!(
            " Read the details back to the user, ask for the price and quantity, \
             then call {COMMIT_TOOL}."
        ));
        tracing::info!(item = %name, "item staged");
        text
    }
}

#[async_trait]
impl ToolHandler for StageTool {
    fn name(&self) -> &str {
        STAGE_TOOL
    }

    fn description(&self) -> &str {
        "Draft a new inventory item from the user's description. Nothing is saved \
         until commit_item is called. Staging again replaces the current draft."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Item name"},
                "category": {"type": "string"},
                "brand": {"type": "string"},
                "condition": {"type": "string", "description": "e.g. new, like new, used"},
                "description": {"type": "string"}
            },
            "required": ["name"]
        })
    }

    async fn execute(
        &self,
        invocation: ToolInvocation,
        staged: &mut StagedSlot,
    ) -> Result<String, ToolError> {
        match invocation {
            ToolInvocation::Stage(args) => Ok(Self::stage(args, staged)),
            other => Err(ToolError::mismatch(STAGE_TOOL, &other)),
        }
    }
}
