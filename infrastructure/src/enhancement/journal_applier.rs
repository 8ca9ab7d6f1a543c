//! Applier that records enhancements in a journal instead of changing
//! anything directly.
//!
//! Each applied enhancement is written to the store under [`JOURNAL_KEY`]
//! with `action: "apply"`; a rollback writes a matching `action: "revert"`
//! entry. Downstream tooling replays the journal. Targets listed as
//! protected fail validation, which exercises the pipeline's rollback path.

use async_trait::async_trait;
use forge_application::ports::enhancement_applier::{ApplyError, EnhancementApplier};
use forge_application::ports::persistent_store::PersistentStore;
use forge_domain::{EnhancementId, EnhancementKind, QueuedEnhancement};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const JOURNAL_KEY: &str = "enhancement_journal";

pub struct JournalApplier {
    kind: EnhancementKind,
    store: Arc<dyn PersistentStore>,
    protected_targets: HashSet<String>,
    applied: Mutex<HashMap<EnhancementId, Value>>,
}

impl JournalApplier {
    pub fn new(kind: EnhancementKind, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            kind,
            store,
            protected_targets: HashSet::new(),
            applied: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_protected_target(mut self, target: impl Into<String>) -> Self {
        self.protected_targets.insert(target.into());
        self
    }

    pub fn with_protected_targets(mut self, targets: impl IntoIterator<Item = String>) -> Self {
        self.protected_targets.extend(targets);
        self
    }

    pub fn applied_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EnhancementId, Value>> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EnhancementApplier for JournalApplier {
    fn kind(&self) -> EnhancementKind {
        self.kind
    }

    async fn apply(&self, enhancement: &QueuedEnhancement) -> Result<Value, ApplyError> {
        let request = &enhancement.request;
        let entry = json!({
            "action": "apply",
            "id": enhancement.id,
            "kind": request.kind,
            "source": request.source,
            "target": request.target,
            "metadata": request.metadata,
        });
        self.store
            .record(JOURNAL_KEY, entry.clone())
            .await
            .map_err(|e| ApplyError::Failed(e.to_string()))?;

        debug!(id = %enhancement.id, target = %request.target, "Journaled enhancement");
        self.lock().insert(enhancement.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn validate(&self, enhancement: &QueuedEnhancement, applied: &Value) -> Result<bool, ApplyError> {
        let journaled = self
            .lock()
            .get(&enhancement.id)
            .is_some_and(|entry| entry == applied);
        Ok(journaled && !self.protected_targets.contains(&enhancement.request.target))
    }

    async fn rollback(&self, enhancement: &QueuedEnhancement) -> Result<(), ApplyError> {
        self.lock().remove(&enhancement.id);
        self.store
            .record(
                JOURNAL_KEY,
                json!({ "action": "revert", "id": enhancement.id }),
            )
            .await
            .map_err(|e| ApplyError::Rollback(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use forge_application::ports::persistent_store::RecordFilter;
    use forge_domain::{EnhancementRequest, SafetyCheck};

    fn queued(target: &str) -> QueuedEnhancement {
        QueuedEnhancement::new(
            EnhancementRequest::new(EnhancementKind::File, "agent-7", target),
            SafetyCheck::from_violations(Vec::new()),
        )
    }

    #[tokio::test]
    async fn test_apply_validate_and_revert() {
        let store = Arc::new(MemoryStore::new());
        let applier = JournalApplier::new(EnhancementKind::File, store.clone());
        let item = queued("config.yaml");

        let applied = applier.apply(&item).await.unwrap();
        assert!(applier.validate(&item, &applied).await.unwrap());
        assert_eq!(applier.applied_count(), 1);

        applier.rollback(&item).await.unwrap();
        assert_eq!(applier.applied_count(), 0);

        let journal = store.query(&RecordFilter::key(JOURNAL_KEY)).await.unwrap();
        let actions: Vec<_> = journal.iter().filter_map(|r| r.field_str("action")).collect();
        assert_eq!(actions, vec!["revert", "apply"]);
    }

    #[tokio::test]
    async fn test_protected_target_fails_validation() {
        let applier = JournalApplier::new(EnhancementKind::File, Arc::new(MemoryStore::new()))
            .with_protected_target("Cargo.lock");
        let item = queued("Cargo.lock");

        let applied = applier.apply(&item).await.unwrap();

        assert!(!applier.validate(&item, &applied).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_enhancement_does_not_validate() {
        let applier = JournalApplier::new(EnhancementKind::File, Arc::new(MemoryStore::new()));
        assert!(!applier.validate(&queued("x"), &json!({})).await.unwrap());
    }
}
