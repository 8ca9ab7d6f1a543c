//! Agent identity value objects.
//!
//! - [`AgentId`] - Unique identifier of a registered agent
//! - [`AgentKind`] - What role an agent plays in the orchestration core

use serde::{Deserialize, Serialize};

/// Unique identifier for a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Creates an AgentId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random AgentId.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of an agent.
///
/// The triage tiers map onto [`AgentKind::Autonomous`] and
/// [`AgentKind::Architect`]; the remaining kinds are ordinary service agents
/// that exchange prompts through the communication service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Prompt,
    Scraper,
    Model,
    Enhancement,
    Autonomous,
    Architect,
    Triage,
}

impl AgentKind {
    pub fn as_str(&self) -> &str {
        match self {
            AgentKind::Prompt => "prompt",
            AgentKind::Scraper => "scraper",
            AgentKind::Model => "model",
            AgentKind::Enhancement => "enhancement",
            AgentKind::Autonomous => "autonomous",
            AgentKind::Architect => "architect",
            AgentKind::Triage => "triage",
        }
    }

    pub fn all() -> &'static [AgentKind] {
        &[
            AgentKind::Prompt,
            AgentKind::Scraper,
            AgentKind::Model,
            AgentKind::Enhancement,
            AgentKind::Autonomous,
            AgentKind::Architect,
            AgentKind::Triage,
        ]
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentKind::all()
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown agent kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_generate_is_unique() {
        assert_ne!(AgentId::generate(), AgentId::generate());
    }

    #[test]
    fn test_agent_id_serializes_as_plain_string() {
        let id = AgentId::new("scraper-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"scraper-1\"");
    }

    #[test]
    fn test_agent_kind_parse_roundtrip() {
        for kind in AgentKind::all() {
            assert_eq!(kind.as_str().parse::<AgentKind>().unwrap(), *kind);
        }
        assert!("wizard".parse::<AgentKind>().is_err());
    }
}
