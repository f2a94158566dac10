//! Tools the model can call.
//!
//! Three tools implement a two-phase add flow over the record store:
//! `query_items` (read-only), `stage_item` (draft) and `commit_item`
//! (finalize). Arguments are validated into a [`ToolInvocation`] before any
//! handler runs, and every outcome reaches the model as plain text.

pub mod args;
pub mod commit;
pub mod query;
pub mod registry;
pub mod stage;
pub mod types;

use std::sync::Arc;

pub use args::{ToolArgError, ToolInvocation};
pub use commit::CommitTool;
pub use query::{ModelSearch, QueryTool, SemanticSearch};
pub use registry::ToolRegistry;
pub use stage::StageTool;
pub use types::{ToolCall, ToolError, ToolHandler, ToolResult};

use crate::store::RecordStore;

/// Build a registry with the standard tool set over `store`.
pub fn standard_registry(
    store: Arc<dyn RecordStore>,
    search: Option<Arc<dyn SemanticSearch>>,
) -> ToolRegistry {
    let mut query = QueryTool::new(Arc::clone(&store));
    if let Some(search) = search {
        query = query.with_search(search);
    }
    let mut registry = ToolRegistry::new();
    registry.register_handler(Arc::new(query));
    registry.register_handler(Arc::new(StageTool));
    registry.register_handler(Arc::new(CommitTool::new(store)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    #[test]
    fn standard_registry_has_three_tools() {
        let registry = standard_registry(Arc::new(MemoryRecordStore::new()), None);
        assert_eq!(
            registry.names(),
            vec![args::COMMIT_TOOL, args::QUERY_TOOL, args::STAGE_TOOL]
        );
        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object");
        }
    }
}
