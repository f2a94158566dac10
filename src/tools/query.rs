//! Read-only record lookup.
//!
//! Structured filters go to the record store. When the model also supplied
//! a free-text question and a [`SemanticSearch`] collaborator is configured,
//! the question is answered over the filtered records. If that remote step
//! fails, the tool answers with a locally computed summary labelled
//! `[fallback summary]` instead of failing the round.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::args::{QUERY_TOOL, QueryArgs, ToolInvocation};
use super::types::{ToolError, ToolHandler};
use crate::agent::session::StagedSlot;
use crate::llm::message::DialogueTurn;
use crate::llm::provider::{ModelProvider, ModelRequest};
use crate::store::{Record, RecordQuery, RecordStore};

/// Label prefixed to degraded query output.
pub const FALLBACK_LABEL: &str = "[fallback summary]";

/// Records listed in a local summary.
const SUMMARY_TOP_N: usize = 5;

/// Answers a free-text question over a set of records.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Answer `question` using only `records`.
    async fn answer(&self, question: &str, records: &[Record]) -> Result<String, ToolError>;
}

/// [`SemanticSearch`] backed by a model provider.
pub struct ModelSearch {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl ModelSearch {
    /// Create a search that asks `model` through `provider`.
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SemanticSearch for ModelSearch {
    async fn answer(&self, question: &str, records: &[Record]) -> Result<String, ToolError> {
        let listing = serde_json::to_string(records)
            .map_err(|e| ToolError::Failed(format!("failed to encode records: {e}")))?;
        let prompt = format!(
            "Records (JSON):\n{listing}\n\nQuestion: {question}\n\
             Answer in one or two sentences using only these records."
        );
        let request = ModelRequest::new(&self.model, vec![DialogueTurn::user_text(prompt)])
            .with_system_instruction(Some(
                "You answer questions about an inventory. Never invent records.".into(),
            ));
        let response = self
            .provider
            .generate(&request)
            .await
            .map_err(|e| ToolError::Failed(format!("semantic search failed: {e}")))?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(ToolError::Failed("semantic search returned no text".into()));
        }
        Ok(text.to_string())
    }
}

/// The `query_items` tool.
pub struct QueryTool {
    store: Arc<dyn RecordStore>,
    search: Option<Arc<dyn SemanticSearch>>,
}

impl QueryTool {
    /// Create a query tool over `store` without semantic search.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            search: None,
        }
    }

    /// Attach a semantic search collaborator.
    pub fn with_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.search = Some(search);
        self
    }

    async fn run(&self, args: QueryArgs) -> Result<String, ToolError> {
        let query = RecordQuery {
            category: args.category.clone(),
            brand: args.brand.clone(),
            condition: args.condition.clone(),
            min_price: args.min_price,
            max_price: args.max_price,
            limit: Some(args.effective_limit()),
        };
        let records = self.store.query(&query).await?;
        tracing::debug!(hits = records.len(), "store query finished");

        if records.is_empty() {
            return Ok("No matching items found.".to_string());
        }

        let (Some(question), Some(search)) = (args.question(), &self.search) else {
            return Ok(summarize(&records));
        };

        match search.answer(question, &records).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                tracing::warn!(error = %e, "semantic search failed, answering locally");
                Ok(format!("{FALLBACK_LABEL} {}", summarize(&records)))
            }
        }
    }
}

#[async_trait]
impl ToolHandler for QueryTool {
    fn name(&self) -> &str {
        QUERY_TOOL
    }

    fn description(&self) -> &str {
        "Look up inventory items. Filter by category, brand, condition and price range; \
         optionally ask a free-text question about the matches."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "category": {"type": "string", "description": "Item category"},
                "brand": {"type": "string", "description": "Brand name"},
                "condition": {"type": "string", "description": "Condition, e.g. new or used"},
                "min_price": {"type": "number", "description": "Minimum price"},
                "max_price": {"type": "number", "description": "Maximum price"},
                "query": {"type": "string", "description": "Free-text question about the matching items"},
                "limit": {"type": "integer", "description": "Maximum items to consider (1-50)"}
            }
        })
    }

    async fn execute(
        &self,
        invocation: ToolInvocation,
        _staged: &mut StagedSlot,
    ) -> Result<String, ToolError> {
        match invocation {
            ToolInvocation::Query(args) => self.run(args).await,
            other => Err(ToolError::mismatch(QUERY_TOOL, &other)),
        }
    }
}

/// Local summary: count, total quantity, price range and the first few records.
pub fn summarize(records: &[Record]) -> String {
    if records.is_empty() {
        return "No matching items found.".to_string();
    }
    let total_quantity: u64 = records.iter().map(|r| u64::from(r.quantity)).sum();
    let (low, high) = records.iter().fold((f64::MAX, f64::MIN), |(lo, hi), r| {
        (lo.min(r.price), hi.max(r.price))
    });

    let top: Vec<String> = records
        .iter()
        .take(SUMMARY_TOP_N)
        .map(|r| format!("{} (${:.2}, qty {})", r.name(), r.price, r.quantity))
        .collect();

    let noun = if records.len() == 1 { "item" } else { "items" };
    let range = if (high - low).abs() < f64::EPSILON {
        format!("priced at ${low:.2}")
    } else {
        format!("priced ${low:.2} to ${high:.2}")
    };
    format!(
        "Found {} {noun}, {total_quantity} units in total, {range}. Top matches: {}.",
        records.len(),
        top.join("; ")
    )
}
