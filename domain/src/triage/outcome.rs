//! Triage state, context and results

use super::entities::TriageId;
use super::pattern::ErrorPattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolution tiers, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerTier {
    Enhancement,
    Autonomous,
    Architecture,
}

impl HandlerTier {
    /// All tiers in escalation order.
    pub const ORDER: [HandlerTier; 3] = [
        HandlerTier::Enhancement,
        HandlerTier::Autonomous,
        HandlerTier::Architecture,
    ];

    /// Tier used for attempt `n` (0-based). `None` past the last tier.
    pub fn for_attempt(n: usize) -> Option<HandlerTier> {
        Self::ORDER.get(n).copied()
    }

    pub fn as_str(&self) -> &str {
        match self {
            HandlerTier::Enhancement => "enhancement",
            HandlerTier::Autonomous => "autonomous",
            HandlerTier::Architecture => "architecture",
        }
    }
}

impl std::fmt::Display for HandlerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a triage request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "attempt")]
pub enum TriageState {
    New,
    Analyzing,
    Attempting(u8),
    Resolved,
    EscalatedToArchitect,
}

impl TriageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TriageState::Resolved | TriageState::EscalatedToArchitect)
    }
}

/// An earlier error associated with the same component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedError {
    pub message: String,
    pub component: Option<String>,
    pub at: DateTime<Utc>,
}

impl RelatedError {
    pub fn new(message: impl Into<String>, component: Option<String>) -> Self {
        Self {
            message: message.into(),
            component,
            at: Utc::now(),
        }
    }
}

/// Everything known about a failure while it is being triaged.
///
/// Owned by a single `handle_request` call; never shared between requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error: String,
    pub stack_trace: Option<String>,
    pub component: Option<String>,
    pub related_errors: Vec<RelatedError>,
    /// Handler name -> status snapshot
    pub system_state: BTreeMap<String, serde_json::Value>,
    pub recommended_strategy: Option<String>,
}

impl ErrorContext {
    pub fn push_related(&mut self, message: impl Into<String>) {
        self.related_errors
            .push(RelatedError::new(message, self.component.clone()));
    }

    /// Error messages in the order they were observed.
    pub fn error_history(&self) -> Vec<String> {
        let mut history = vec![self.error.clone()];
        history.extend(self.related_errors.iter().map(|e| e.message.clone()));
        history
    }
}

/// What a resolution handler reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub success: bool,
    pub result: serde_json::Value,
}

impl HandlerOutcome {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result,
        }
    }

    pub fn failure(result: serde_json::Value) -> Self {
        Self {
            success: false,
            result,
        }
    }
}

/// One resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 0-based attempt number; the final architect call has no tier slot of its own
    pub attempt: u32,
    pub tier: HandlerTier,
    pub handler: String,
    pub priority: u8,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// What `handle_request` always returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub request_id: TriageId,
    pub success: bool,
    /// Name of the handler that produced the final result
    pub assigned_agent: String,
    pub attempts: Vec<AttemptRecord>,
    /// Set when every tier failed and the final architect call was made
    pub escalated: bool,
    pub final_escalation: Option<AttemptRecord>,
    pub resolution: serde_json::Value,
    pub pattern: Option<ErrorPattern>,
    pub recommended_strategy: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TriageResult {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

/// Knowledge shared with every handler after a successful resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub pattern_type: String,
    /// Name of the handler that resolved the request
    pub strategy: String,
    pub success_factors: Vec<String>,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}
