//! Domain layer for agent-forge
//!
//! This crate contains the entities, value objects and events of the
//! service-agent orchestration core. It has no dependencies on
//! infrastructure, runtime or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Agents
//!
//! An [`Agent`] is a named, typed unit with a status lifecycle
//! (inactive → active → error/inactive, anything → terminated) and
//! heartbeat-based liveness.
//!
//! ## Triage
//!
//! A [`TriageRequest`] is routed through increasingly capable
//! [`HandlerTier`]s until it is resolved or escalated to the architect.
//!
//! ## Enhancements
//!
//! An [`EnhancementRequest`] is an automatic system change that must pass a
//! [`SafetyCheck`] and a duplication check before it may be applied.

pub mod agent;
pub mod core;
pub mod enhancement;
pub mod event;
pub mod message;
pub mod triage;
pub mod util;

// Re-export commonly used types
pub use agent::{Agent, AgentId, AgentKind, AgentMetrics, AgentStatus};
pub use crate::core::{
    error::{DomainError, ErrorKind},
    severity::Severity,
};
pub use enhancement::{
    EnhancementId, EnhancementKind, EnhancementRecord, EnhancementRequest, EnhancementState,
    QueuedEnhancement, SafePattern, SafetyCheck, SafetyRule, SafetyViolation, SystemIssue,
};
pub use event::{ForgeEvent, RejectionReason, Topic};
pub use message::{MessageId, MessageMetadata, PromptRequest, PromptResponse};
pub use triage::{
    AttemptRecord, ErrorContext, ErrorPattern, EscalationDossier, HandlerOutcome, HandlerTier,
    LearningRecord, RelatedError, TriageData, TriageId, TriageKind, TriageRequest, TriageResult,
    TriageState,
};
