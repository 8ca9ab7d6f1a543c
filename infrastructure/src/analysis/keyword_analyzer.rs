//! Keyword-based error classification.
//!
//! Matches the error text against an ordered list of [`KeywordRule`]s and
//! remembers every pattern it has produced, so a repeated error comes back
//! with a higher `frequency`. File paths are pulled out of stack traces into
//! `related_files`.

use async_trait::async_trait;
use forge_application::ports::error_analyzer::ErrorAnalyzer;
use forge_domain::{ErrorContext, ErrorPattern, Severity};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Matches `path/to/file.ext:line` in stack traces.
const FILE_REF: &str = r"([A-Za-z0-9_./\\-]+\.[A-Za-z0-9]+):\d+";

const MAX_RELATED_FILES: usize = 5;

/// Maps keywords to a pattern type.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub pattern_type: String,
    pub keywords: Vec<String>,
    pub severity: Severity,
    pub fix: Option<String>,
}

impl KeywordRule {
    pub fn new(
        pattern_type: impl Into<String>,
        severity: Severity,
        keywords: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            pattern_type: pattern_type.into(),
            keywords: keywords.into_iter().map(str::to_lowercase).collect(),
            severity,
            fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

pub struct KeywordAnalyzer {
    rules: Vec<KeywordRule>,
    file_ref: Option<Regex>,
    seen: Mutex<HashMap<String, ErrorPattern>>,
}

impl KeywordAnalyzer {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self {
            rules,
            file_ref: Regex::new(FILE_REF).ok(),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Rules for the failures agents commonly report.
    pub fn default_rules() -> Vec<KeywordRule> {
        vec![
            KeywordRule::new("timeout", Severity::Medium, ["timeout", "timed out", "deadline"])
                .with_fix("retry with a longer timeout"),
            KeywordRule::new(
                "connection",
                Severity::High,
                ["connection refused", "connection reset", "unreachable", "dns"],
            )
            .with_fix("check the upstream service"),
            KeywordRule::new("rate_limit", Severity::Medium, ["rate limit", "429", "too many requests"])
                .with_fix("back off and reduce request rate"),
            KeywordRule::new("auth", Severity::High, ["unauthorized", "forbidden", "401", "403"])
                .with_fix("refresh credentials"),
            KeywordRule::new("parse", Severity::Medium, ["parse", "selector", "unexpected token", "invalid json"])
                .with_fix("update the extraction logic"),
            KeywordRule::new("resource", Severity::Critical, ["out of memory", "oom", "disk full", "no space"])
                .with_fix("free resources or scale up"),
        ]
    }

    /// Distinct patterns seen so far.
    pub fn known_patterns(&self) -> Vec<ErrorPattern> {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let mut patterns: Vec<_> = seen.values().cloned().collect();
        patterns.sort_by(|a, b| a.pattern_type.cmp(&b.pattern_type));
        patterns
    }

    fn related_files(&self, stack_trace: &str) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        let Some(file_ref) = &self.file_ref else {
            return files;
        };
        for capture in file_ref.captures_iter(stack_trace) {
            let file = capture[1].to_string();
            if !files.contains(&file) {
                files.push(file);
            }
            if files.len() == MAX_RELATED_FILES {
                break;
            }
        }
        files
    }
}

impl Default for KeywordAnalyzer {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

#[async_trait]
impl ErrorAnalyzer for KeywordAnalyzer {
    async fn classify(&self, context: &ErrorContext) -> ErrorPattern {
        let text = context.error.to_lowercase();
        let rule = self.rules.iter().find(|r| r.matches(&text));

        let mut fresh = match rule {
            Some(rule) => {
                let pattern = ErrorPattern::new(rule.pattern_type.clone(), rule.severity)
                    .with_context(context.error.clone());
                match &rule.fix {
                    Some(fix) => pattern.with_fix(fix.clone()),
                    None => pattern,
                }
            }
            None => ErrorPattern::unclassified(context.error.clone()),
        };
        if let Some(trace) = &context.stack_trace {
            fresh.related_files = self.related_files(trace);
        }

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let pattern = match seen.get_mut(&fresh.pattern_type) {
            Some(known) => {
                known.observe();
                known.context = fresh.context;
                for file in fresh.related_files {
                    if !known.related_files.contains(&file) {
                        known.related_files.push(file);
                    }
                }
                known.clone()
            }
            None => {
                seen.insert(fresh.pattern_type.clone(), fresh.clone());
                fresh
            }
        };

        debug!(
            pattern = %pattern.pattern_type,
            frequency = pattern.frequency,
            component = ?context.component,
            "Classified error"
        );
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(error: &str) -> ErrorContext {
        ErrorContext {
            error: error.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_keyword_match() {
        let analyzer = KeywordAnalyzer::default();

        let pattern = analyzer.classify(&context("Request Timed Out after 30s")).await;

        assert_eq!(pattern.pattern_type, "timeout");
        assert_eq!(pattern.severity, Severity::Medium);
        assert_eq!(pattern.frequency, 1);
        assert_eq!(pattern.suggested_fixes, vec!["retry with a longer timeout"]);
    }

    #[tokio::test]
    async fn test_unknown_error_is_unclassified() {
        let analyzer = KeywordAnalyzer::default();
        let pattern = analyzer.classify(&context("something odd")).await;
        assert_eq!(pattern.pattern_type, "unclassified");
    }

    #[tokio::test]
    async fn test_repeated_pattern_grows_frequency() {
        let analyzer = KeywordAnalyzer::default();

        analyzer.classify(&context("connection refused")).await;
        let pattern = analyzer.classify(&context("connection reset by peer")).await;

        assert_eq!(pattern.pattern_type, "connection");
        assert_eq!(pattern.frequency, 2);
        assert_eq!(pattern.context, "connection reset by peer");
        assert_eq!(analyzer.known_patterns().len(), 1);
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let analyzer = KeywordAnalyzer::new(vec![
            KeywordRule::new("first", Severity::Low, ["boom"]),
            KeywordRule::new("second", Severity::High, ["boom"]),
        ]);
        let pattern = analyzer.classify(&context("BOOM")).await;
        assert_eq!(pattern.pattern_type, "first");
    }

    #[tokio::test]
    async fn test_related_files_from_stack_trace() {
        let analyzer = KeywordAnalyzer::default();
        let mut ctx = context("invalid json in response");
        ctx.stack_trace = Some(
            "at parse (src/scraper/parser.ts:42:7)\n\
             at run (src/scraper/parser.ts:90:1)\n\
             at main (bin/worker.py:12)"
                .to_string(),
        );

        let pattern = analyzer.classify(&ctx).await;

        assert_eq!(pattern.pattern_type, "parse");
        assert_eq!(
            pattern.related_files,
            vec!["src/scraper/parser.ts", "bin/worker.py"]
        );
    }
}
