//! Triage engine parameters.
//!
//! The number of tiers is fixed at three; only the pause between attempts
//! and the context sizes are configurable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay inserted before each escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay before every escalation
    Fixed { delay: Duration },
    /// `base * 2^n` before escalation `n` (0-based), capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed {
            delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn none() -> Self {
        BackoffPolicy::Fixed {
            delay: Duration::ZERO,
        }
    }

    /// Delay before leaving attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt);
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageParams {
    pub backoff: BackoffPolicy,
    /// Number of recent errors of the same component pulled into the context.
    pub related_error_limit: usize,
    /// Priority of the final request sent to the architect.
    pub terminal_priority: u8,
}

impl Default for TriageParams {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            related_error_limit: 5,
            terminal_priority: 10,
        }
    }
}

impl TriageParams {
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_related_error_limit(mut self, limit: usize) -> Self {
        self.related_error_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fixed_five_seconds() {
        let params = TriageParams::default();
        assert_eq!(params.backoff.delay_for(0), Duration::from_secs(5));
        assert_eq!(params.backoff.delay_for(1), Duration::from_secs(5));
        assert_eq!(params.related_error_limit, 5);
        assert_eq!(params.terminal_priority, 10);
    }

    #[test]
    fn test_exponential_is_capped() {
        let backoff = BackoffPolicy::Exponential {
            base: Duration::from_secs(2),
            max: Duration::from_secs(6),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(6));
        assert_eq!(backoff.delay_for(40), Duration::from_secs(6));
    }
}
