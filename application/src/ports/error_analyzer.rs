//! Error analysis port

use async_trait::async_trait;
use forge_domain::{ErrorContext, ErrorPattern};

/// Classifies an error context into an [`ErrorPattern`].
///
/// Implementations own their pattern records and bump `frequency` when the
/// same pattern is seen again.
#[async_trait]
pub trait ErrorAnalyzer: Send + Sync {
    async fn classify(&self, context: &ErrorContext) -> ErrorPattern;
}

/// Analyzer that classifies everything as `unclassified`.
pub struct NoAnalysis;

#[async_trait]
impl ErrorAnalyzer for NoAnalysis {
    async fn classify(&self, context: &ErrorContext) -> ErrorPattern {
        ErrorPattern::unclassified(context.error.clone())
    }
}
