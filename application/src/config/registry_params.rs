//! Agent registry parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How `get_agent` chooses between several active agents of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Fewest handled requests wins; ties go to the earliest registration
    #[default]
    LeastLoaded,
    /// Earliest registration wins
    FirstRegistered,
}

impl std::str::FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "least_loaded" => Ok(SelectionPolicy::LeastLoaded),
            "first_registered" => Ok(SelectionPolicy::FirstRegistered),
            other => Err(format!("unknown selection policy: {}", other)),
        }
    }
}

/// Heartbeat monitoring and agent selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryParams {
    /// How often the health monitor scans all agents.
    pub health_check_interval: Duration,
    /// An active agent whose last heartbeat is older than this is marked inactive.
    pub heartbeat_timeout: Duration,
    pub selection_policy: SelectionPolicy,
}

impl Default for RegistryParams {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            selection_policy: SelectionPolicy::default(),
        }
    }
}

impl RegistryParams {
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_selection_policy(mut self, policy: SelectionPolicy) -> Self {
        self.selection_policy = policy;
        self
    }
}
