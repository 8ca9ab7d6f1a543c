//! Resolution handler port
//!
//! Each triage tier (enhancement, autonomous control, architecture analysis)
//! is reached through a [`ResolutionHandler`].

use async_trait::async_trait;
use forge_domain::{ErrorKind, HandlerOutcome, LearningRecord, TriageRequest};
use serde_json::Value;
use thiserror::Error;

/// Errors a handler may raise instead of returning an outcome.
///
/// The triage engine treats every variant as a transient failure of the
/// attempt and escalates.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected ({kind}): {message}")]
    Rejected { kind: ErrorKind, message: String },
}

/// A tier that tries to resolve a triage request.
#[async_trait]
pub trait ResolutionHandler: Send + Sync {
    /// Name reported as `assigned_agent` when this handler resolves a request.
    fn name(&self) -> &str;

    /// Try to resolve the request.
    async fn handle(&self, request: &TriageRequest) -> Result<HandlerOutcome, HandlerError>;

    /// Status snapshot included in the error context of every request.
    async fn status(&self) -> Value {
        serde_json::json!({ "name": self.name() })
    }

    /// Receive knowledge from a successful resolution (by any handler).
    async fn learn(&self, _record: &LearningRecord) {}
}
