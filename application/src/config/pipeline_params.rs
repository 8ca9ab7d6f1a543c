//! Enhancement pipeline parameters.

use forge_domain::SafetyRule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParams {
    /// How often pending enhancements are processed.
    pub process_interval: Duration,
    /// How often the system scanner runs.
    pub safety_scan_interval: Duration,
    /// How often successful history is mined for safe patterns.
    pub pattern_learning_interval: Duration,
    /// Successful applications needed before a (type, source) pair is known safe.
    pub min_successes_for_safe_pattern: usize,
    /// Rules active from startup.
    pub rules: Vec<SafetyRule>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(5 * 60),
            safety_scan_interval: Duration::from_secs(15 * 60),
            pattern_learning_interval: Duration::from_secs(60 * 60),
            min_successes_for_safe_pattern: 3,
            rules: Vec::new(),
        }
    }
}

impl PipelineParams {
    pub fn with_rule(mut self, rule: SafetyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_min_successes(mut self, min: usize) -> Self {
        self.min_successes_for_safe_pattern = min.max(1);
        self
    }
}
