//! Triage domain module
//!
//! Requests, error patterns and results for routing failures through the
//! enhancement, autonomous and architecture tiers.

pub mod entities;
pub mod outcome;
pub mod pattern;

pub use entities::{EscalationDossier, TriageData, TriageId, TriageKind, TriageRequest};
pub use outcome::{
    AttemptRecord, ErrorContext, HandlerOutcome, HandlerTier, LearningRecord, RelatedError,
    TriageResult, TriageState,
};
pub use pattern::ErrorPattern;
