//! Domain error types
//!
//! Every service-level error in agent-forge maps onto one [`ErrorKind`], which
//! decides how the error propagates: validation-style errors surface to the
//! caller immediately, transient failures are converted into escalation, and
//! terminal failures are reported as structured results.

use crate::agent::entities::AgentStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of failures across all components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request or unknown target
    Validation,
    /// Enhancement rejected by an active safety rule
    SafetyViolation,
    /// Enhancement with the same type and source already exists
    Duplicate,
    /// Unknown agent
    NotFound,
    /// A handler failed during a triage attempt; eligible for escalation
    Transient,
    /// All triage attempts exhausted
    Terminal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::SafetyViolation => "safety_violation",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Terminal => "terminal",
        }
    }

    /// Errors of these kinds are reported to the caller synchronously and
    /// never enter any queue.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::SafetyViolation | ErrorKind::Duplicate
        )
    }

    /// Whether the triage engine may escalate after this kind of failure.
    pub fn is_escalatable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid status transition for agent {agent_id}: {from} -> {to}")]
    InvalidTransition {
        agent_id: String,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid safety rule pattern '{pattern}': {reason}")]
    InvalidRulePattern { pattern: String, reason: String },
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_kinds() {
        assert!(ErrorKind::Validation.is_rejection());
        assert!(ErrorKind::SafetyViolation.is_rejection());
        assert!(ErrorKind::Duplicate.is_rejection());
        assert!(!ErrorKind::Transient.is_rejection());
        assert!(!ErrorKind::NotFound.is_rejection());
    }

    #[test]
    fn test_only_transient_escalates() {
        assert!(ErrorKind::Transient.is_escalatable());
        assert!(!ErrorKind::Terminal.is_escalatable());
        assert!(!ErrorKind::Validation.is_escalatable());
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            agent_id: "agent-1".to_string(),
            from: AgentStatus::Terminated,
            to: AgentStatus::Active,
        };
        assert_eq!(
            error.to_string(),
            "Invalid status transition for agent agent-1: terminated -> active"
        );
        assert_eq!(error.kind(), ErrorKind::Validation);
    }
}
