//! Inter-agent message entities

use crate::agent::value_objects::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a single prompt request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery metadata attached to every prompt request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub timestamp: DateTime<Utc>,
    /// Higher is more urgent
    pub priority: u8,
    /// Free-form subject area (e.g., "scraping", "triage")
    pub domain: Option<String>,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            priority: 1,
            domain: None,
        }
    }
}

/// A request from one agent to another.
///
/// Created per send call and consumed once delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub id: MessageId,
    pub source_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub task: String,
    pub metadata: MessageMetadata,
}

impl PromptRequest {
    pub fn new(
        source: impl Into<AgentId>,
        target: impl Into<AgentId>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            source_agent_id: source.into(),
            target_agent_id: target.into(),
            task: task.into(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.metadata.domain = Some(domain.into());
        self
    }
}

/// Outcome of a `send_message` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub request_id: MessageId,
    pub success: bool,
    /// Set when the target was known but unavailable and the request was queued
    pub queued: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
    pub optimization_attempts: u32,
    /// Quality of the accepted output (0.0 to 1.0)
    pub quality_score: f64,
}

impl PromptResponse {
    pub fn delivered(
        request_id: MessageId,
        output: impl Into<String>,
        processing_time_ms: u64,
        optimization_attempts: u32,
        quality_score: f64,
    ) -> Self {
        Self {
            request_id,
            success: true,
            queued: false,
            output: Some(output.into()),
            error: None,
            processing_time_ms,
            optimization_attempts,
            quality_score,
        }
    }

    pub fn queued(request_id: MessageId) -> Self {
        Self {
            request_id,
            success: false,
            queued: true,
            output: None,
            error: None,
            processing_time_ms: 0,
            optimization_attempts: 0,
            quality_score: 0.0,
        }
    }

    pub fn failed(request_id: MessageId, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            queued: false,
            output: None,
            error: Some(error.into()),
            processing_time_ms: 0,
            optimization_attempts: 0,
            quality_score: 0.0,
        }
    }

    pub fn with_processing_time(mut self, processing_time_ms: u64) -> Self {
        self.processing_time_ms = processing_time_ms;
        self
    }

    pub fn with_optimization_attempts(mut self, attempts: u32) -> Self {
        self.optimization_attempts = attempts;
        self
    }
}
