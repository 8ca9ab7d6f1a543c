//! System scanner over the enhancement history in the store.

use async_trait::async_trait;
use forge_application::ports::persistent_store::{PersistentStore, RecordFilter, keys};
use forge_application::ports::system_scanner::{ScanError, SystemScanner};
use forge_domain::{EnhancementState, Severity, SystemIssue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reports enhancement sources that keep getting rolled back or failing.
///
/// A source with at least `threshold` unsuccessful outcomes among the last
/// `window` finished enhancements becomes a critical issue whose pattern
/// matches that source literally, so the pipeline blocks it from now on.
pub struct RollbackScanner {
    store: Arc<dyn PersistentStore>,
    threshold: usize,
    window: usize,
}

impl RollbackScanner {
    pub const DEFAULT_THRESHOLD: usize = 3;
    pub const DEFAULT_WINDOW: usize = 500;

    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store,
            threshold: Self::DEFAULT_THRESHOLD,
            window: Self::DEFAULT_WINDOW,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }
}

#[async_trait]
impl SystemScanner for RollbackScanner {
    async fn scan_system(&self) -> Result<Vec<SystemIssue>, ScanError> {
        let records = self
            .store
            .query(&RecordFilter::key(keys::ENHANCEMENT_FINISHED).with_limit(self.window))
            .await
            .map_err(|e| ScanError(e.to_string()))?;

        let unsuccessful = [EnhancementState::RolledBack, EnhancementState::Failed];
        let mut failures: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            let failed = record
                .field_str("state")
                .is_some_and(|s| unsuccessful.iter().any(|u| u.as_str() == s));
            if let Some(source) = record.field_str("source")
                && failed
            {
                *failures.entry(source.to_string()).or_default() += 1;
            }
        }

        Ok(failures
            .into_iter()
            .filter(|(_, count)| *count >= self.threshold)
            .map(|(source, count)| {
                let mut issue = SystemIssue::new(
                    format!("enhancement source '{}' failed {} times", source, count),
                    Severity::Critical,
                )
                .with_pattern(format!("^{}$", regex::escape(&source)));
                issue.location = Some(source);
                issue
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn finished(store: &MemoryStore, source: &str, state: &str) {
        store
            .record(
                keys::ENHANCEMENT_FINISHED,
                json!({ "source": source, "state": state, "kind": "optimization" }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_repeated_rollbacks_become_critical_issue() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..2 {
            finished(&store, "triage:timeout (x)", "rolled_back").await;
        }
        finished(&store, "triage:timeout (x)", "failed").await;
        finished(&store, "triage:parse", "rolled_back").await;
        finished(&store, "triage:parse", "succeeded").await;

        let issues = RollbackScanner::new(store).scan_system().await.unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].pattern.as_deref(), Some(r"^triage:timeout \(x\)$"));
        assert_eq!(issues[0].location.as_deref(), Some("triage:timeout (x)"));
    }

    #[tokio::test]
    async fn test_threshold_is_configurable() {
        let store = Arc::new(MemoryStore::new());
        finished(&store, "triage:parse", "rolled_back").await;

        let scanner = RollbackScanner::new(store).with_threshold(1);
        assert_eq!(scanner.scan_system().await.unwrap().len(), 1);
    }
}
