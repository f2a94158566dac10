//! Finalize the staged item.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::args::{COMMIT_TOOL, CommitArgs, ToolInvocation};
use super::types::{ToolError, ToolHandler};
use crate::agent::session::StagedSlot;
use crate::store::{NewRecord, RecordStore};

/// The `commit_item` tool.
///
/// Requires a staged draft. The draft is cleared only after the store
/// accepts the record; a failed write keeps it so the commit can be retried.
pub struct CommitTool {
    store: Arc<dyn RecordStore>,
}

impl CommitTool {
    /// Create a commit tool writing to `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn commit(&self, args: CommitArgs, staged: &mut StagedSlot) -> Result<String, ToolError> {
        let Some(entity) = staged.get() else {
            return Err(ToolError::NothingStaged);
        };
        let record = NewRecord {
            fields: entity.fields(),
            price: args.price,
            quantity: args.quantity(),
        };

        let created = self.store.create(&record).await?;
        staged.take();
        tracing::info!(record_id = %created.id, item = %created.name(), "item committed");
        Ok(format!(
            "Saved \"{}\": {} at ${:.2} each. The draft is cleared.",
            created.name(),
            created.quantity,
            created.price
        ))
    }
}

#[async_trait]
impl ToolHandler for CommitTool {
    fn name(&self) -> &str {
        COMMIT_TOOL
    }

    fn description(&self) -> &str {
        "Save the currently staged item with its price and quantity."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "price": {"type": "number", "description": "Unit price"},
                "quantity": {"type": "integer", "description": "Units on hand (default 1)"}
            },
            "required": ["price"]
        })
    }

    async fn execute(
        &self,
        invocation: ToolInvocation,
        staged: &mut StagedSlot,
    ) -> Result<String, ToolError> {
        match invocation {
            ToolInvocation::Commit(args) => self.commit(args, staged).await,
            other => Err(ToolError::mismatch(COMMIT_TOOL, &other)),
        }
    }
}
