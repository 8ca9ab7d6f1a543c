//! Agent registry configuration from TOML (`[registry]` section)

use serde::{Deserialize, Serialize};

/// Raw registry configuration from TOML
///
/// # Example
///
/// ```toml
/// [registry]
/// health_check_interval_secs = 30
/// heartbeat_timeout_secs = 60
/// selection_policy = "least_loaded"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRegistryConfig {
    pub health_check_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// `least_loaded` or `first_registered`
    pub selection_policy: String,
}

impl Default for FileRegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            selection_policy: "least_loaded".to_string(),
        }
    }
}
