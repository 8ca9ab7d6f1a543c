//! In-memory store.

use async_trait::async_trait;
use forge_application::ports::persistent_store::{
    PersistentStore, RecordFilter, StoreError, StoredRecord,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Store that keeps records in memory, dropping the oldest beyond `capacity`.
pub struct MemoryStore {
    records: Mutex<VecDeque<StoredRecord>>,
    capacity: usize,
}

impl MemoryStore {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn record(&self, key: &str, fields: Value) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(StoredRecord::new(key, fields));
        Ok(())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(filter.select(records.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let store = MemoryStore::with_capacity(2);
        for n in 0..3 {
            store.record("message", json!({ "n": n })).await.unwrap();
        }

        let records = store.query(&RecordFilter::key("message")).await.unwrap();
        let ns: Vec<_> = records.iter().map(|r| r.fields["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_field_filter() {
        let store = MemoryStore::new();
        store
            .record("triage_error", json!({"component": "a", "error": "x"}))
            .await
            .unwrap();
        store
            .record("triage_error", json!({"component": "b", "error": "y"}))
            .await
            .unwrap();

        let records = store
            .query(&RecordFilter::key("triage_error").with_field("component", "b"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field_str("error"), Some("y"));
    }
}
