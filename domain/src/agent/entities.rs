//! Agent domain entities

use super::value_objects::{AgentId, AgentKind};
use crate::core::error::DomainError;
use crate::util::running_average;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent.
///
/// Allowed transitions:
///
/// ```text
/// inactive --register/start/restart--> active
/// active   --self-reported failure---> error
/// active   --heartbeat miss----------> inactive
/// any      --------------------------> terminated (absorbing)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Inactive,
    Active,
    Error,
    Terminated,
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Inactive => "inactive",
            AgentStatus::Active => "active",
            AgentStatus::Error => "error",
            AgentStatus::Terminated => "terminated",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Staying in the same state is always allowed and treated as a no-op.
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (AgentStatus::Inactive, AgentStatus::Active)
                | (AgentStatus::Active, AgentStatus::Error)
                | (AgentStatus::Active, AgentStatus::Inactive)
                | (_, AgentStatus::Terminated)
        ) && *self != AgentStatus::Terminated
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Terminated)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inactive" => Ok(AgentStatus::Inactive),
            "active" => Ok(AgentStatus::Active),
            "error" => Ok(AgentStatus::Error),
            "terminated" => Ok(AgentStatus::Terminated),
            other => Err(format!("unknown agent status: {}", other)),
        }
    }
}

/// Per-agent request statistics, maintained as running averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub requests_handled: u64,
    /// Fraction of handled requests that succeeded (0.0 to 1.0)
    pub success_rate: f64,
    /// Mean response time in milliseconds
    pub avg_response_time_ms: f64,
}

impl AgentMetrics {
    pub fn record(&mut self, success: bool, elapsed_ms: f64) {
        let n = self.requests_handled;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = running_average(self.success_rate, n, outcome);
        self.avg_response_time_ms = running_average(self.avg_response_time_ms, n, elapsed_ms);
        self.requests_handled = n + 1;
    }
}

/// A named, typed, health-monitored unit with a status lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub kind: AgentKind,
    pub name: String,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub metrics: AgentMetrics,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, kind: AgentKind) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            kind,
            status: AgentStatus::Inactive,
            last_heartbeat: Utc::now(),
            metrics: AgentMetrics::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = at;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Move to `next`, enforcing the status machine.
    ///
    /// Returns the previous status on success.
    pub fn transition_to(&mut self, next: AgentStatus) -> Result<AgentStatus, DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                agent_id: self.id.to_string(),
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat = at;
    }

    /// True when the agent is active but has not sent a heartbeat within `timeout`.
    pub fn heartbeat_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_active() && now - self.last_heartbeat > timeout
    }
}
