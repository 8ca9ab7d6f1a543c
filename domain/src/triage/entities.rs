//! Triage request entities

use super::pattern::ErrorPattern;
use serde::{Deserialize, Serialize};

/// Unique identifier of one logical triage request (stable across escalations).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriageId(String);

impl TriageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TriageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the caller is asking triage to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageKind {
    /// A component failed and needs a fix
    #[default]
    Failure,
    /// An agent is stuck and asks for help
    NeedAssistance,
    /// Something works but should be improved
    Optimization,
}

impl TriageKind {
    pub fn as_str(&self) -> &str {
        match self {
            TriageKind::Failure => "failure",
            TriageKind::NeedAssistance => "need_assistance",
            TriageKind::Optimization => "optimization",
        }
    }
}

impl std::str::FromStr for TriageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "failure" => Ok(TriageKind::Failure),
            "need_assistance" => Ok(TriageKind::NeedAssistance),
            "optimization" => Ok(TriageKind::Optimization),
            other => Err(format!("unknown triage kind: {}", other)),
        }
    }
}

/// Payload of a triage request.
///
/// The well-known fields are lifted out of the otherwise opaque `extra` JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageData {
    pub error: Option<String>,
    pub stack_trace: Option<String>,
    pub component: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Material attached to the final request sent to the architect once every
/// tier has failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationDossier {
    /// Every error seen while handling this request, oldest first
    pub error_history: Vec<String>,
    pub system_state: serde_json::Value,
    pub recommended_actions: Vec<String>,
}

/// A request to route a failure (or a call for help) through the handler tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageRequest {
    pub id: TriageId,
    pub kind: TriageKind,
    pub priority: u8,
    pub source: String,
    pub data: TriageData,
    /// Number of escalations applied so far
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub pattern: Option<ErrorPattern>,
    #[serde(default)]
    pub dossier: Option<EscalationDossier>,
}

impl TriageRequest {
    pub fn new(kind: TriageKind, source: impl Into<String>) -> Self {
        Self {
            id: TriageId::generate(),
            kind,
            priority: 1,
            source: source.into(),
            data: TriageData::default(),
            attempt: 0,
            pattern: None,
            dossier: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.data.error = Some(error.into());
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.data.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.data.component = Some(component.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.data.user_id = Some(user_id.into());
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.data.extra = extra;
        self
    }

    /// Derive the request for the next tier: priority +1, attempt +1, pattern attached.
    pub fn escalate(&self, pattern: &ErrorPattern) -> Self {
        let mut next = self.clone();
        next.priority = self.priority.saturating_add(1);
        next.attempt = self.attempt + 1;
        next.pattern = Some(pattern.clone());
        next
    }

    /// Error text, falling back to a description of the request kind.
    pub fn error_text(&self) -> String {
        self.data
            .error
            .clone()
            .unwrap_or_else(|| format!("{} reported by {}", self.kind.as_str(), self.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::severity::Severity;

    #[test]
    fn test_escalate_bumps_priority_and_attempt() {
        let request = TriageRequest::new(TriageKind::Failure, "scraper")
            .with_priority(3)
            .with_error("timeout");
        let pattern = ErrorPattern::new("timeout", Severity::High);

        let escalated = request.escalate(&pattern);

        assert_eq!(escalated.id, request.id);
        assert_eq!(escalated.priority, 4);
        assert_eq!(escalated.attempt, 1);
        assert_eq!(escalated.pattern.unwrap().pattern_type, "timeout");
        assert_eq!(request.attempt, 0);
    }

    #[test]
    fn test_escalate_saturates_priority() {
        let request = TriageRequest::new(TriageKind::Failure, "x").with_priority(u8::MAX);
        let escalated = request.escalate(&ErrorPattern::new("p", Severity::Low));
        assert_eq!(escalated.priority, u8::MAX);
    }

    #[test]
    fn test_deserialize_minimal_request() {
        let json = r#"{
            "id": "t-1",
            "kind": "need_assistance",
            "priority": 2,
            "source": "wizard",
            "data": {"error": null, "stack_trace": null, "component": "builder", "user_id": "u-9"}
        }"#;
        let request: TriageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, TriageKind::NeedAssistance);
        assert_eq!(request.attempt, 0);
        assert_eq!(request.data.component.as_deref(), Some("builder"));
        assert_eq!(request.error_text(), "need_assistance reported by wizard");
    }
}
