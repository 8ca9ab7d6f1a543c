//! Enhancement pipeline configuration from TOML (`[enhancement]` section)

use serde::{Deserialize, Serialize};

/// Raw enhancement pipeline configuration from TOML
///
/// # Example
///
/// ```toml
/// [enhancement]
/// process_interval_secs = 300
/// min_successes = 3
///
/// [[enhancement.rules]]
/// name = "no-shell"
/// pattern = "rm -rf|sudo "
/// applies_to = ["file", "dependency"]
/// severity = "critical"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEnhancementConfig {
    pub process_interval_secs: u64,
    pub safety_scan_interval_secs: u64,
    pub pattern_learning_interval_secs: u64,
    /// Successful applications before a (type, source) pair is known safe
    pub min_successes: usize,
    /// Sources treated as failing after this many rollbacks by the scanner
    pub rollback_threshold: usize,
    /// Targets the journal applier refuses to validate
    pub protected_targets: Vec<String>,
    pub rules: Vec<FileSafetyRule>,
}

impl Default for FileEnhancementConfig {
    fn default() -> Self {
        Self {
            process_interval_secs: 300,
            safety_scan_interval_secs: 900,
            pattern_learning_interval_secs: 3600,
            min_successes: 3,
            rollback_threshold: 3,
            protected_targets: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// A safety rule as written in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSafetyRule {
    pub name: String,
    pub pattern: String,
    /// Enhancement types; empty means all
    #[serde(default)]
    pub applies_to: Vec<String>,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_severity() -> String {
    "high".to_string()
}

fn default_active() -> bool {
    true
}
