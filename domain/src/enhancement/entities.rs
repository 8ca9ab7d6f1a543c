//! Enhancement entities

use super::safety::SafetyCheck;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier assigned when an enhancement enters the pending map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnhancementId(String);

impl EnhancementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("enh-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnhancementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of system change, which selects the applier that performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementKind {
    Component,
    Model,
    File,
    Dependency,
    Optimization,
}

impl EnhancementKind {
    pub fn as_str(&self) -> &str {
        match self {
            EnhancementKind::Component => "component",
            EnhancementKind::Model => "model",
            EnhancementKind::File => "file",
            EnhancementKind::Dependency => "dependency",
            EnhancementKind::Optimization => "optimization",
        }
    }

    pub fn all() -> &'static [EnhancementKind] {
        &[
            EnhancementKind::Component,
            EnhancementKind::Model,
            EnhancementKind::File,
            EnhancementKind::Dependency,
            EnhancementKind::Optimization,
        ]
    }
}

impl std::fmt::Display for EnhancementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnhancementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnhancementKind::all()
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown enhancement type: {}", s))
    }
}

/// A proposed automatic system change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementRequest {
    pub kind: EnhancementKind,
    /// Origin of the change (agent, pattern or file that proposed it)
    pub source: String,
    /// What the change applies to
    pub target: String,
    pub priority: u8,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EnhancementRequest {
    pub fn new(kind: EnhancementKind, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
            priority: 1,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Two requests are duplicates when they share type and source.
    pub fn duplicates(&self, other: &EnhancementRequest) -> bool {
        self.kind == other.kind && self.source == other.source
    }
}

/// Lifecycle position of a queued enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementState {
    Pending,
    Processing,
    Succeeded,
    RolledBack,
    Failed,
}

impl EnhancementState {
    pub fn as_str(&self) -> &str {
        match self {
            EnhancementState::Pending => "pending",
            EnhancementState::Processing => "processing",
            EnhancementState::Succeeded => "succeeded",
            EnhancementState::RolledBack => "rolled_back",
            EnhancementState::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            EnhancementState::Succeeded | EnhancementState::RolledBack | EnhancementState::Failed
        )
    }
}

/// An enhancement that passed both gates and entered the pending map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEnhancement {
    pub id: EnhancementId,
    pub request: EnhancementRequest,
    pub state: EnhancementState,
    pub safety_check: SafetyCheck,
    pub queued_at: DateTime<Utc>,
}

impl QueuedEnhancement {
    pub fn new(request: EnhancementRequest, safety_check: SafetyCheck) -> Self {
        Self {
            id: EnhancementId::generate(),
            request,
            state: EnhancementState::Pending,
            safety_check,
            queued_at: Utc::now(),
        }
    }
}

/// Finished enhancement kept for pattern learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementRecord {
    pub id: EnhancementId,
    pub kind: EnhancementKind,
    pub source: String,
    pub target: String,
    pub state: EnhancementState,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl EnhancementRecord {
    pub fn finished(item: &QueuedEnhancement, state: EnhancementState, error: Option<String>) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.request.kind,
            source: item.request.source.clone(),
            target: item.request.target.clone(),
            state,
            error,
            finished_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == EnhancementState::Succeeded
    }
}
