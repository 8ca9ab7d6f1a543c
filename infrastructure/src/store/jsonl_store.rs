//! JSONL file store for audit records.
//!
//! Each record is serialized as a single JSON line with `key` and
//! `timestamp` fields merged into its payload, appended through a buffered
//! writer. The newest lines are mirrored in memory, up to a capacity, so
//! queries see earlier runs without re-reading the file.

use crate::store::MemoryStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use forge_application::ports::persistent_store::{
    PersistentStore, RecordFilter, StoreError, StoredRecord,
};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

const KEY_FIELD: &str = "key";
const TIMESTAMP_FIELD: &str = "timestamp";
const DATA_FIELD: &str = "data";

struct JsonlState {
    writer: BufWriter<File>,
    records: VecDeque<StoredRecord>,
}

/// Append-only JSONL store.
///
/// Thread-safe via a single `Mutex`. Flushes after every record and on `Drop`.
pub struct JsonlStore {
    state: Mutex<JsonlState>,
    path: PathBuf,
    capacity: usize,
}

impl JsonlStore {
    /// Open (or create) the store at `path`, creating parent directories.
    ///
    /// Lines that cannot be parsed are skipped with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_capacity(path, MemoryStore::DEFAULT_CAPACITY)
    }

    /// Like [`open`](Self::open), keeping at most `capacity` records queryable.
    pub fn open_with_capacity(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let capacity = capacity.max(1);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("could not create {}: {}", parent.display(), e))
            })?;
        }

        let records = if path.exists() {
            Self::load(path, capacity)?
        } else {
            VecDeque::new()
        };
        debug!(path = %path.display(), records = records.len(), "Opened JSONL store");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::Io(format!("could not open {}: {}", path.display(), e)))?;

        Ok(Self {
            state: Mutex::new(JsonlState {
                writer: BufWriter::new(file),
                records,
            }),
            path: path.to_path_buf(),
            capacity,
        })
    }

    /// Get the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the file line by line, keeping only the newest `capacity` records.
    fn load(path: &Path, capacity: usize) -> Result<VecDeque<StoredRecord>, StoreError> {
        let file = File::open(path)
            .map_err(|e| StoreError::Io(format!("could not read {}: {}", path.display(), e)))?;

        let mut records = VecDeque::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_line(&line) {
                Some(record) => push_bounded(&mut records, record, capacity),
                None => warn!(path = %path.display(), line = n + 1, "Skipping malformed store line"),
            }
        }
        Ok(records)
    }

    fn parse_line(line: &str) -> Option<StoredRecord> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(line).ok()? else {
            return None;
        };
        let key = map.remove(KEY_FIELD)?.as_str()?.to_string();
        let recorded_at = map
            .remove(TIMESTAMP_FIELD)
            .and_then(|t| t.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        // Non-object payloads were wrapped under `data`
        let fields = if map.len() == 1 && map.contains_key(DATA_FIELD) {
            map.remove(DATA_FIELD).unwrap_or(Value::Null)
        } else {
            Value::Object(map)
        };

        Some(StoredRecord {
            key,
            fields,
            recorded_at,
        })
    }

    fn to_line(record: &StoredRecord) -> Result<String, StoreError> {
        let timestamp = record
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        // Merge payload with key + timestamp
        let line = match &record.fields {
            Value::Object(fields) => {
                let mut map = fields.clone();
                map.insert(KEY_FIELD.to_string(), Value::String(record.key.clone()));
                map.insert(TIMESTAMP_FIELD.to_string(), Value::String(timestamp));
                Value::Object(map)
            }
            other => {
                let mut map = Map::new();
                map.insert(KEY_FIELD.to_string(), Value::String(record.key.clone()));
                map.insert(TIMESTAMP_FIELD.to_string(), Value::String(timestamp));
                map.insert(DATA_FIELD.to_string(), other.clone());
                Value::Object(map)
            }
        };

        serde_json::to_string(&line).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JsonlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PersistentStore for JsonlStore {
    async fn record(&self, key: &str, fields: Value) -> Result<(), StoreError> {
        let record = StoredRecord::new(key, fields);
        let line = Self::to_line(&record)?;

        let mut state = self.lock();
        writeln!(state.writer, "{}", line).map_err(|e| StoreError::Io(e.to_string()))?;
        // Flush every record; the file is append-only
        state
            .writer
            .flush()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        push_bounded(&mut state.records, record, self.capacity);
        Ok(())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(filter.select(self.lock().records.iter()))
    }
}

fn push_bounded(records: &mut VecDeque<StoredRecord>, record: StoredRecord, capacity: usize) {
    if records.len() == capacity {
        records.pop_front();
    }
    records.push_back(record);
}

impl Drop for JsonlStore {
    fn drop(&mut self) {
        let _ = self.lock().writer.flush();
    }
}
