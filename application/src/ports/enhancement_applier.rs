//! Enhancement applier port
//!
//! One [`EnhancementApplier`] per [`EnhancementKind`] performs the actual
//! system change, checks its post-condition and undoes it on failure.

use async_trait::async_trait;
use forge_domain::{EnhancementKind, QueuedEnhancement};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApplyError {
    #[error("Failed to apply enhancement: {0}")]
    Failed(String),

    #[error("Validation could not run: {0}")]
    Validation(String),

    #[error("Rollback failed: {0}")]
    Rollback(String),
}

#[async_trait]
pub trait EnhancementApplier: Send + Sync {
    fn kind(&self) -> EnhancementKind;

    /// Perform the change and describe what was done.
    async fn apply(&self, enhancement: &QueuedEnhancement) -> Result<Value, ApplyError>;

    /// Post-condition check. `Ok(false)` triggers a rollback.
    async fn validate(
        &self,
        enhancement: &QueuedEnhancement,
        applied: &Value,
    ) -> Result<bool, ApplyError>;

    async fn rollback(&self, enhancement: &QueuedEnhancement) -> Result<(), ApplyError>;
}
