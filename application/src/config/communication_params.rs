//! Communication service parameters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationParams {
    /// Replies scoring below this are sent back to the endpoint for another pass.
    pub quality_threshold: f64,
    /// Upper bound on endpoint passes for a single request (at least 1).
    pub max_optimization_attempts: u32,
}

impl Default for CommunicationParams {
    fn default() -> Self {
        Self {
            quality_threshold: 0.7,
            max_optimization_attempts: 3,
        }
    }
}

impl CommunicationParams {
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_optimization_attempts(mut self, attempts: u32) -> Self {
        self.max_optimization_attempts = attempts.max(1);
        self
    }
}
