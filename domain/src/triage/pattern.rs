//! Error patterns produced by error analysis

use crate::core::severity::Severity;
use serde::{Deserialize, Serialize};

/// A recognised class of error.
///
/// The error-analysis collaborator owns these records; `frequency` grows each
/// time the same pattern is seen again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub pattern_type: String,
    pub severity: Severity,
    pub frequency: u32,
    pub context: String,
    pub suggested_fixes: Vec<String>,
    pub related_files: Vec<String>,
}

impl ErrorPattern {
    pub fn new(pattern_type: impl Into<String>, severity: Severity) -> Self {
        Self {
            pattern_type: pattern_type.into(),
            severity,
            frequency: 1,
            context: String::new(),
            suggested_fixes: Vec::new(),
            related_files: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fixes.push(fix.into());
        self
    }

    pub fn with_related_file(mut self, file: impl Into<String>) -> Self {
        self.related_files.push(file.into());
        self
    }

    /// Record another sighting of this pattern.
    pub fn observe(&mut self) {
        self.frequency = self.frequency.saturating_add(1);
    }

    /// Pattern used when no analysis is available.
    pub fn unclassified(context: impl Into<String>) -> Self {
        Self::new("unclassified", Severity::Medium).with_context(context)
    }
}
