//! Strategy selection by observed success rate.

use async_trait::async_trait;
use forge_application::ports::strategy_selector::StrategySelector;
use forge_domain::ErrorPattern;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    successes: u32,
    attempts: u32,
}

impl Tally {
    /// Laplace-smoothed success rate; an untried strategy scores 0.5.
    fn score(&self) -> f64 {
        (f64::from(self.successes) + 1.0) / (f64::from(self.attempts) + 2.0)
    }
}

/// Picks the candidate with the best smoothed success rate for a pattern.
///
/// Ties keep candidate order, so with no history the first candidate wins.
#[derive(Default)]
pub struct SuccessRateSelector {
    tallies: Mutex<HashMap<(String, String), Tally>>,
}

impl SuccessRateSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smoothed success rate of `strategy` against `pattern_type`.
    pub fn score(&self, pattern_type: &str, strategy: &str) -> f64 {
        let tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        tallies
            .get(&(pattern_type.to_string(), strategy.to_string()))
            .copied()
            .unwrap_or_default()
            .score()
    }
}

#[async_trait]
impl StrategySelector for SuccessRateSelector {
    async fn recommend(&self, pattern: &ErrorPattern, candidates: &[String]) -> Option<String> {
        let mut best: Option<(&String, f64)> = None;
        for candidate in candidates {
            let score = self.score(&pattern.pattern_type, candidate);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((candidate, score));
            }
        }
        let (strategy, score) = best?;
        debug!(pattern = %pattern.pattern_type, %strategy, score, "Recommended strategy");
        Some(strategy.clone())
    }

    async fn record_outcome(&self, pattern_type: &str, strategy: &str, success: bool) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        let tally = tallies
            .entry((pattern_type.to_string(), strategy.to_string()))
            .or_default();
        tally.attempts += 1;
        if success {
            tally.successes += 1;
        }
    }
}
