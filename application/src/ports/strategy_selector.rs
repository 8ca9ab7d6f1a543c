//! Strategy selection port
//!
//! Given an error pattern and the names of the available handlers, a
//! [`StrategySelector`] recommends which one is most likely to succeed.
//! The recommendation is advisory: the escalation order is fixed.

use async_trait::async_trait;
use forge_domain::ErrorPattern;

#[async_trait]
pub trait StrategySelector: Send + Sync {
    /// Recommend one of `candidates`, or `None` without an opinion.
    async fn recommend(&self, pattern: &ErrorPattern, candidates: &[String]) -> Option<String>;

    /// Feed back how a strategy fared for a pattern.
    async fn record_outcome(&self, _pattern_type: &str, _strategy: &str, _success: bool) {}
}

/// Selector that always recommends the first candidate.
pub struct FirstCandidate;

#[async_trait]
impl StrategySelector for FirstCandidate {
    async fn recommend(&self, _pattern: &ErrorPattern, candidates: &[String]) -> Option<String> {
        candidates.first().cloned()
    }
}
