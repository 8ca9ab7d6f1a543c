//! Orchestration events
//!
//! Every state change in agent-forge is announced as a [`ForgeEvent`]. The
//! enum is closed: each topic has exactly one variant with a typed payload,
//! and [`Topic`] names the variant without its payload for subscriptions.

use crate::agent::{AgentId, AgentKind, AgentStatus};
use crate::enhancement::{EnhancementId, EnhancementKind};
use crate::message::MessageId;
use crate::triage::{HandlerTier, TriageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription key for one event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    AgentRegistered,
    AgentDeregistered,
    AgentStatusUpdated,
    AgentHeartbeatMissed,
    AgentRestarted,
    AgentRestartFailed,
    MessageQueued,
    MessageDelivered,
    EnhancementQueued,
    EnhancementRejected,
    EnhancementApplied,
    EnhancementRolledBack,
    EnhancementFailed,
    SafetyScanCompleted,
    SafetyPatternsLearned,
    TriageAttempted,
    TriageEscalated,
    TriageResolved,
    TriageArchitectEscalation,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::AgentRegistered => "agent:registered",
            Topic::AgentDeregistered => "agent:deregistered",
            Topic::AgentStatusUpdated => "agent:status_updated",
            Topic::AgentHeartbeatMissed => "agent:heartbeat_missed",
            Topic::AgentRestarted => "agent:restarted",
            Topic::AgentRestartFailed => "agent:restart_failed",
            Topic::MessageQueued => "message:queued",
            Topic::MessageDelivered => "message:delivered",
            Topic::EnhancementQueued => "enhancement:queued",
            Topic::EnhancementRejected => "enhancement:rejected",
            Topic::EnhancementApplied => "enhancement:applied",
            Topic::EnhancementRolledBack => "enhancement:rolled_back",
            Topic::EnhancementFailed => "enhancement:failed",
            Topic::SafetyScanCompleted => "safety:scan_completed",
            Topic::SafetyPatternsLearned => "safety:patterns_learned",
            Topic::TriageAttempted => "triage:attempted",
            Topic::TriageEscalated => "triage:escalated",
            Topic::TriageResolved => "triage:resolved",
            Topic::TriageArchitectEscalation => "triage:architect_escalation",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an enhancement never reached the pending map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    SafetyViolation,
    Duplicate,
}

/// A state change announced on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum ForgeEvent {
    #[serde(rename = "agent:registered")]
    AgentRegistered { agent_id: AgentId, kind: AgentKind },

    #[serde(rename = "agent:deregistered")]
    AgentDeregistered { agent_id: AgentId },

    #[serde(rename = "agent:status_updated")]
    AgentStatusUpdated {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[serde(rename = "agent:heartbeat_missed")]
    AgentHeartbeatMissed {
        agent_id: AgentId,
        last_heartbeat: DateTime<Utc>,
    },

    #[serde(rename = "agent:restarted")]
    AgentRestarted { agent_id: AgentId },

    #[serde(rename = "agent:restart_failed")]
    AgentRestartFailed { agent_id: AgentId, error: String },

    #[serde(rename = "message:queued")]
    MessageQueued {
        message_id: MessageId,
        target: AgentId,
        queue_len: usize,
    },

    #[serde(rename = "message:delivered")]
    MessageDelivered {
        message_id: MessageId,
        target: AgentId,
        success: bool,
        from_queue: bool,
    },

    #[serde(rename = "enhancement:queued")]
    EnhancementQueued {
        id: EnhancementId,
        kind: EnhancementKind,
        source: String,
    },

    #[serde(rename = "enhancement:rejected")]
    EnhancementRejected {
        kind: EnhancementKind,
        source: String,
        reason: RejectionReason,
        detail: String,
    },

    #[serde(rename = "enhancement:applied")]
    EnhancementApplied { id: EnhancementId },

    #[serde(rename = "enhancement:rolled_back")]
    EnhancementRolledBack { id: EnhancementId, reason: String },

    #[serde(rename = "enhancement:failed")]
    EnhancementFailed { id: EnhancementId, error: String },

    #[serde(rename = "safety:scan_completed")]
    SafetyScanCompleted { issues: usize, rules_added: usize },

    #[serde(rename = "safety:patterns_learned")]
    SafetyPatternsLearned { total: usize, added: usize },

    #[serde(rename = "triage:attempted")]
    TriageAttempted {
        request_id: TriageId,
        attempt: u32,
        tier: HandlerTier,
        handler: String,
        success: bool,
    },

    #[serde(rename = "triage:escalated")]
    TriageEscalated {
        request_id: TriageId,
        attempt: u32,
        priority: u8,
    },

    #[serde(rename = "triage:resolved")]
    TriageResolved {
        request_id: TriageId,
        handler: String,
        attempts: u32,
    },

    #[serde(rename = "triage:architect_escalation")]
    TriageArchitectEscalation { request_id: TriageId, success: bool },
}

impl ForgeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ForgeEvent::AgentRegistered { .. } => Topic::AgentRegistered,
            ForgeEvent::AgentDeregistered { .. } => Topic::AgentDeregistered,
            ForgeEvent::AgentStatusUpdated { .. } => Topic::AgentStatusUpdated,
            ForgeEvent::AgentHeartbeatMissed { .. } => Topic::AgentHeartbeatMissed,
            ForgeEvent::AgentRestarted { .. } => Topic::AgentRestarted,
            ForgeEvent::AgentRestartFailed { .. } => Topic::AgentRestartFailed,
            ForgeEvent::MessageQueued { .. } => Topic::MessageQueued,
            ForgeEvent::MessageDelivered { .. } => Topic::MessageDelivered,
            ForgeEvent::EnhancementQueued { .. } => Topic::EnhancementQueued,
            ForgeEvent::EnhancementRejected { .. } => Topic::EnhancementRejected,
            ForgeEvent::EnhancementApplied { .. } => Topic::EnhancementApplied,
            ForgeEvent::EnhancementRolledBack { .. } => Topic::EnhancementRolledBack,
            ForgeEvent::EnhancementFailed { .. } => Topic::EnhancementFailed,
            ForgeEvent::SafetyScanCompleted { .. } => Topic::SafetyScanCompleted,
            ForgeEvent::SafetyPatternsLearned { .. } => Topic::SafetyPatternsLearned,
            ForgeEvent::TriageAttempted { .. } => Topic::TriageAttempted,
            ForgeEvent::TriageEscalated { .. } => Topic::TriageEscalated,
            ForgeEvent::TriageResolved { .. } => Topic::TriageResolved,
            ForgeEvent::TriageArchitectEscalation { .. } => Topic::TriageArchitectEscalation,
        }
    }
}
