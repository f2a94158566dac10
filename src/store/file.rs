//! JSON-file record store.
//!
//! All records live in one JSON array on disk. The file is loaded once when
//! the store opens; each `create` rewrites it atomically (temp file, fsync,
//! rename).
//!
//! # Examples
//!
//! ```no_run
//! use colloquy::store::JsonFileStore;
//!
//! let store = JsonFileStore::open("/tmp/colloquy/records.json").unwrap();
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{NewRecord, Record, RecordQuery, RecordStore, StoreError, select};

/// Record store persisted as a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Vec<Record>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if an existing file cannot be read or parsed,
    /// or the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), records = records.len(), "opened record store");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `records` and replace the backing file on the blocking pool.
    async fn persist(&self, records: &[Record]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store writer task failed: {e}")))?
    }
}

/// Temp file, fsync, rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        let records = self.records.lock().await;
        Ok(select(&records, query))
    }

    async fn create(&self, record: &NewRecord) -> Result<Record, StoreError> {
        let created = record.clone().into_record();
        let mut records = self.records.lock().await;
        records.push(created.clone());
        // Held across the write so concurrent creates persist in order.
        if let Err(e) = self.persist(&records).await {
            records.pop();
            tracing::error!(error = %e, path = %self.path.display(), "record write failed");
            return Err(e);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::collections::BTreeMap;

    use super::*;

    fn new_record(name: &str) -> NewRecord {
        NewRecord {
            fields: BTreeMap::from([("name".to_owned(), name.to_owned())]),
            price: 5.0,
            quantity: 1,
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("records.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.create(&new_record("kettle")).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        let hits = reopened.query(&RecordQuery::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name(), "kettle");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_creates_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = JsonFileStore::open(&path).unwrap();

        let names: Vec<String> = (0..8).map(|i| format!("item-{i}")).collect();
        let records: Vec<NewRecord> = names.iter().map(|name| new_record(name)).collect();
        let created = futures_util::future::join_all(
            records.iter().map(|record| store.create(record)),
        )
        .await;
        assert!(created.iter().all(Result::is_ok));

        let reopened = JsonFileStore::open(&path).unwrap();
        let hits = reopened.query(&RecordQuery::default()).await.unwrap();
        assert_eq!(hits.len(), 8);
        for name in &names {
            assert!(hits.iter().any(|r| r.name() == *name));
        }
    }

    #[test]
    fn empty_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "").unwrap();
        assert!(JsonFileStore::open(&path).is_ok());
    }

    #[test]
    fn corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "[{not json").unwrap();
        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = JsonFileStore::open(&path).unwrap();
        // Make the rename target a directory so the write fails.
        std::fs::create_dir(&path).unwrap();

        assert!(store.create(&new_record("x")).await.is_err());
        let hits = store.query(&RecordQuery::default()).await.unwrap();
        assert!(hits.is_empty());
    }
}
