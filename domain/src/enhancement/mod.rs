//! Enhancement domain module
//!
//! Proposed automatic system changes, the safety rules that gate them and
//! the records kept once they finish.

pub mod entities;
pub mod safety;

pub use entities::{
    EnhancementId, EnhancementKind, EnhancementRecord, EnhancementRequest, EnhancementState,
    QueuedEnhancement,
};
pub use safety::{SafePattern, SafetyCheck, SafetyRule, SafetyViolation, SystemIssue};
