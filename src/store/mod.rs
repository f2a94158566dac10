//! Record storage.
//!
//! The engine treats persistence as an external collaborator reached through
//! the narrow [`RecordStore`] trait: filtered lookup and creation, nothing
//! else. [`MemoryRecordStore`] backs tests and demos; [`JsonFileStore`] keeps
//! records in a single JSON file for the binaries.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use file::JsonFileStore;
pub use memory::MemoryRecordStore;

/// Errors raised by a record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backing file could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized.
    #[error("storage data invalid: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier.
    pub id: Uuid,
    /// Flat descriptive fields (name, category, brand, ...).
    pub fields: BTreeMap<String, String>,
    /// Unit price.
    pub price: f64,
    /// Units on hand.
    pub quantity: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Field value by key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Display name, falling back to the id.
    pub fn name(&self) -> String {
        self.field("name")
            .map(str::to_owned)
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Input for [`RecordStore::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Flat descriptive fields.
    pub fields: BTreeMap<String, String>,
    /// Unit price.
    pub price: f64,
    /// Units on hand.
    pub quantity: u32,
}

impl NewRecord {
    /// Materialize into a [`Record`] with a fresh id and timestamp.
    pub fn into_record(self) -> Record {
        Record {
            id: Uuid::new_v4(),
            fields: self.fields,
            price: self.price,
            quantity: self.quantity,
            created_at: Utc::now(),
        }
    }
}

/// Structured filter for [`RecordStore::query`].
///
/// Text filters match field values case-insensitively; unset filters match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Category filter.
    pub category: Option<String>,
    /// Brand filter.
    pub brand: Option<String>,
    /// Condition filter.
    pub condition: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    pub max_price: Option<f64>,
    /// Maximum records returned. `None` means no limit.
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Whether `record` passes every set filter (ignores `limit`).
    pub fn matches(&self, record: &Record) -> bool {
        let text_ok = |key: &str, want: &Option<String>| match want {
            Some(want) => record
                .field(key)
                .is_some_and(|have| have.eq_ignore_ascii_case(want.trim())),
            None => true,
        };
        text_ok("category", &self.category)
            && text_ok("brand", &self.brand)
            && text_ok("condition", &self.condition)
            && self.min_price.is_none_or(|min| record.price >= min)
            && self.max_price.is_none_or(|max| record.price <= max)
    }
}

/// Async record storage backend.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records matching `query`, newest first, truncated to `query.limit`.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError>;

    /// Persist a new record and return it.
    async fn create(&self, record: &NewRecord) -> Result<Record, StoreError>;
}

/// Apply a query to an in-memory slice: filter, newest first, limit.
pub(crate) fn select(records: &[Record], query: &RecordQuery) -> Vec<Record> {
    let mut hits: Vec<Record> = records
        .iter()
        .filter(|r| query.matches(r))
        .cloned()
        .collect();
    hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if let Some(limit) = query.limit {
        hits.truncate(limit);
    }
    hits
}
