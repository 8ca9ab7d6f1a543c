//! Triage configuration from TOML (`[triage]` section)

use serde::{Deserialize, Serialize};

/// Raw triage configuration from TOML
///
/// # Example
///
/// ```toml
/// [triage]
/// backoff = "exponential"
/// backoff_secs = 2
/// backoff_max_secs = 30
/// related_error_limit = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTriageConfig {
    /// `fixed` or `exponential`
    pub backoff: String,
    /// Fixed delay, or the base of the exponential delay
    pub backoff_secs: u64,
    /// Cap for exponential back-off
    pub backoff_max_secs: u64,
    pub related_error_limit: usize,
    /// Priority of the final request sent to the architect
    pub terminal_priority: u8,
}

impl Default for FileTriageConfig {
    fn default() -> Self {
        Self {
            backoff: "fixed".to_string(),
            backoff_secs: 5,
            backoff_max_secs: 60,
            related_error_limit: 5,
            terminal_priority: 10,
        }
    }
}
