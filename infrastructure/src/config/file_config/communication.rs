//! Communication configuration from TOML (`[communication]` section)

use serde::{Deserialize, Serialize};

/// Raw communication configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCommunicationConfig {
    /// Minimum acceptable reply quality (0.0 to 1.0)
    pub quality_threshold: f64,
    pub max_optimization_attempts: u32,
}

impl Default for FileCommunicationConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.7,
            max_optimization_attempts: 3,
        }
    }
}
