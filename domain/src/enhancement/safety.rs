//! Safety rules, checks and scan results

use super::entities::EnhancementKind;
use crate::core::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rule that rejects enhancements whose `source` matches `pattern`.
///
/// `pattern` is a regular expression; compilation happens where rules are
/// loaded so that an invalid pattern is reported before any check runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRule {
    pub id: String,
    pub name: String,
    pub pattern: String,
    /// Enhancement kinds the rule applies to; empty means all kinds
    #[serde(default)]
    pub applies_to: Vec<EnhancementKind>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_active() -> bool {
    true
}

impl SafetyRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            pattern: pattern.into(),
            applies_to: Vec::new(),
            severity: Severity::High,
            active: true,
            description: String::new(),
        }
    }

    pub fn for_kinds(mut self, kinds: impl IntoIterator<Item = EnhancementKind>) -> Self {
        self.applies_to = kinds.into_iter().collect();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether the rule is active and scoped to `kind`.
    pub fn is_in_scope(&self, kind: EnhancementKind) -> bool {
        self.active && (self.applies_to.is_empty() || self.applies_to.contains(&kind))
    }
}

/// One rule hit recorded by a safety check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolation {
    /// Name of the matched rule
    pub rule: String,
    pub description: String,
    pub severity: Severity,
}

/// Outcome of checking an enhancement against the active rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub passed: bool,
    pub violations: Vec<SafetyViolation>,
    /// The (type, source) pair matched a pattern learned from past successes
    #[serde(default)]
    pub known_safe: bool,
    pub checked_at: Option<DateTime<Utc>>,
}

impl SafetyCheck {
    pub fn from_violations(violations: Vec<SafetyViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
            known_safe: false,
            checked_at: Some(Utc::now()),
        }
    }

    /// Single human-readable line naming every matched rule.
    pub fn summary(&self) -> String {
        if self.passed {
            return "passed".to_string();
        }
        self.violations
            .iter()
            .map(|v| format!("{} ({}): {}", v.rule, v.severity, v.description))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

/// A problem reported by the system scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemIssue {
    pub description: String,
    pub severity: Severity,
    /// Source pattern that, if present on a critical issue, becomes a new safety rule
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl SystemIssue {
    pub fn new(description: impl Into<String>, severity: Severity) -> Self {
        Self {
            description: description.into(),
            severity,
            pattern: None,
            location: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// A (type, source) pair proven safe by repeated successful application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SafePattern {
    pub kind: EnhancementKind,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_patterns_sort_by_kind_then_source() {
        let set: std::collections::BTreeSet<_> = [
            SafePattern { kind: EnhancementKind::File, source: "a".to_string() },
            SafePattern { kind: EnhancementKind::Component, source: "z".to_string() },
            SafePattern { kind: EnhancementKind::Component, source: "b".to_string() },
        ]
        .into_iter()
        .collect();

        let order: Vec<_> = set.iter().map(|p| (p.kind, p.source.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (EnhancementKind::Component, "b"),
                (EnhancementKind::Component, "z"),
                (EnhancementKind::File, "a"),
            ]
        );
    }

    #[test]
    fn test_rule_scope() {
        let everywhere = SafetyRule::new("no-rm", "rm -rf");
        let model_only = SafetyRule::new("no-eval", "eval").for_kinds([EnhancementKind::Model]);
        let disabled = SafetyRule::new("off", ".*").inactive();

        assert!(everywhere.is_in_scope(EnhancementKind::File));
        assert!(model_only.is_in_scope(EnhancementKind::Model));
        assert!(!model_only.is_in_scope(EnhancementKind::File));
        assert!(!disabled.is_in_scope(EnhancementKind::Model));
    }

    #[test]
    fn test_check_summary_lists_rules() {
        let check = SafetyCheck::from_violations(vec![
            SafetyViolation {
                rule: "no-eval".to_string(),
                description: "dynamic code".to_string(),
                severity: Severity::High,
            },
            SafetyViolation {
                rule: "no-net".to_string(),
                description: "network access".to_string(),
                severity: Severity::Critical,
            },
        ]);

        assert!(!check.passed);
        assert_eq!(
            check.summary(),
            "no-eval (high): dynamic code; no-net (critical): network access"
        );
        assert_eq!(check.max_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: SafetyRule =
            serde_json::from_str(r#"{"id":"r1","name":"r1","pattern":"evil"}"#).unwrap();
        assert!(rule.active);
        assert!(rule.applies_to.is_empty());
        assert_eq!(rule.severity, Severity::Medium);
    }
}
