//! Port for the append-only persistent store.
//!
//! Defines the [`PersistentStore`] trait used for audit logs, agent
//! snapshots and triage/enhancement history.
//!
//! This is separate from `tracing`-based diagnostics: tracing carries
//! human-readable operation logs, while the store keeps machine-readable
//! records that later steps query (related errors, learning history).
//!
//! Writes are best-effort everywhere. Services go through [`AuditTrail`],
//! which logs and swallows store failures so they never abort an in-memory
//! state transition that has already happened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Record keys written by the orchestration services.
pub mod keys {
    pub const AGENT_SNAPSHOT: &str = "agent_snapshot";
    pub const AGENT_HEALTH: &str = "agent_health";
    pub const MESSAGE: &str = "message";
    pub const TRIAGE_ERROR: &str = "triage_error";
    pub const TRIAGE_OUTCOME: &str = "triage_outcome";
    pub const ENHANCEMENT_QUEUED: &str = "enhancement_queued";
    pub const ENHANCEMENT_REJECTED: &str = "enhancement_rejected";
    pub const SAFETY_CHECK: &str = "safety_check";
    pub const ENHANCEMENT_ROLLBACK: &str = "enhancement_rollback";
    pub const ENHANCEMENT_FINISHED: &str = "enhancement_finished";
    pub const SAFETY_SCAN: &str = "safety_scan";
}

/// Errors reported by store adapters.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A record as returned by [`PersistentStore::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub fields: Value,
    pub recorded_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, fields: Value) -> Self {
        Self {
            key: key.into(),
            fields,
            recorded_at: Utc::now(),
        }
    }

    /// String value of a top-level field, if present.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Query over stored records. Results are returned newest first.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub key: Option<String>,
    /// Top-level fields that must equal the given values
    pub field_equals: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field_equals.push((name.into(), value.into()));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        if let Some(key) = &self.key
            && key != &record.key
        {
            return false;
        }
        self.field_equals
            .iter()
            .all(|(name, value)| record.fields.get(name) == Some(value))
    }

    /// Apply the filter to records stored oldest first.
    pub fn select<'a>(&self, records: impl DoubleEndedIterator<Item = &'a StoredRecord>) -> Vec<StoredRecord> {
        let matching = records.rev().filter(|r| self.matches(r)).cloned();
        match self.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

/// Append-only persistent store.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Append a record under `key`.
    async fn record(&self, key: &str, fields: Value) -> Result<(), StoreError>;

    /// Records matching `filter`, newest first.
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError>;
}

/// Store that keeps nothing. For tests and when persistence is disabled.
pub struct NoStore;

#[async_trait]
impl PersistentStore for NoStore {
    async fn record(&self, _key: &str, _fields: Value) -> Result<(), StoreError> {
        Ok(())
    }

    async fn query(&self, _filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(Vec::new())
    }
}

/// Best-effort wrapper used by every service.
///
/// Failures are logged at `warn` and otherwise ignored.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn PersistentStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, key: &str, fields: Value) {
        if let Err(e) = self.store.record(key, fields).await {
            warn!(key, error = %e, "Failed to persist record");
        }
    }

    pub async fn query(&self, filter: &RecordFilter) -> Vec<StoredRecord> {
        match self.store.query(filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!(key = ?filter.key, error = %e, "Failed to query store");
                Vec::new()
            }
        }
    }
}
