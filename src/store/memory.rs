//! In-memory record store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{NewRecord, Record, RecordQuery, RecordStore, StoreError, select};

/// In-memory record store for testing and ephemeral usage.
///
/// Records live in an `Arc<RwLock<Vec>>` and are lost when the last clone
/// is dropped. Cheaply cloneable.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<Vec<Record>>>,
}

impl MemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().await;
        Ok(select(&records, query))
    }

    async fn create(&self, record: &NewRecord) -> Result<Record, StoreError> {
        let created = record.clone().into_record();
        self.records.write().await.push(created.clone());
        Ok(created)
    }
}
