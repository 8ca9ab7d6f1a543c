//! Raw TOML configuration data types
//!
//! These structs mirror the config file exactly. [`FileConfig::to_forge_config`]
//! validates them and converts them into the application parameters.

mod communication;
mod enhancement;
mod registry;
mod store;
mod triage;

pub use communication::FileCommunicationConfig;
pub use enhancement::{FileEnhancementConfig, FileSafetyRule};
pub use registry::FileRegistryConfig;
pub use store::FileStoreConfig;
pub use triage::FileTriageConfig;

use forge_application::config::{
    BackoffPolicy, CommunicationParams, ForgeConfig, PipelineParams, RegistryParams,
    SelectionPolicy, TriageParams,
};
use forge_domain::{EnhancementKind, SafetyRule, Severity};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("{field} cannot be 0")]
    Zero { field: &'static str },

    #[error("communication.quality_threshold must be between 0.0 and 1.0, got {0}")]
    QualityThreshold(f64),

    #[error("{field}: unknown value '{value}' (expected one of: {expected})")]
    UnknownValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("safety rule '{rule}' has an invalid pattern: {message}")]
    InvalidRulePattern { rule: String, message: String },

    #[error("safety rule name cannot be empty")]
    EmptyRuleName,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub registry: FileRegistryConfig,
    pub communication: FileCommunicationConfig,
    pub triage: FileTriageConfig,
    pub enhancement: FileEnhancementConfig,
    pub store: FileStoreConfig,
}

impl FileConfig {
    /// Validate the configuration, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.to_forge_config().map(|_| ())
    }

    /// Convert into application parameters.
    pub fn to_forge_config(&self) -> Result<ForgeConfig, ConfigValidationError> {
        Ok(ForgeConfig {
            registry: self.registry_params()?,
            communication: self.communication_params()?,
            triage: self.triage_params()?,
            pipeline: self.pipeline_params()?,
        })
    }

    fn registry_params(&self) -> Result<RegistryParams, ConfigValidationError> {
        let registry = &self.registry;
        let policy = registry
            .selection_policy
            .parse::<SelectionPolicy>()
            .map_err(|_| ConfigValidationError::UnknownValue {
                field: "registry.selection_policy".to_string(),
                value: registry.selection_policy.clone(),
                expected: "least_loaded, first_registered",
            })?;

        Ok(RegistryParams::default()
            .with_health_check_interval(secs(
                registry.health_check_interval_secs,
                "registry.health_check_interval_secs",
            )?)
            .with_heartbeat_timeout(secs(
                registry.heartbeat_timeout_secs,
                "registry.heartbeat_timeout_secs",
            )?)
            .with_selection_policy(policy))
    }

    fn communication_params(&self) -> Result<CommunicationParams, ConfigValidationError> {
        let communication = &self.communication;
        if !(0.0..=1.0).contains(&communication.quality_threshold) {
            return Err(ConfigValidationError::QualityThreshold(
                communication.quality_threshold,
            ));
        }
        if communication.max_optimization_attempts == 0 {
            return Err(ConfigValidationError::Zero {
                field: "communication.max_optimization_attempts",
            });
        }

        Ok(CommunicationParams::default()
            .with_quality_threshold(communication.quality_threshold)
            .with_max_optimization_attempts(communication.max_optimization_attempts))
    }

    fn triage_params(&self) -> Result<TriageParams, ConfigValidationError> {
        let triage = &self.triage;
        let backoff = match triage.backoff.to_lowercase().as_str() {
            "fixed" => BackoffPolicy::Fixed {
                delay: Duration::from_secs(triage.backoff_secs),
            },
            "exponential" => BackoffPolicy::Exponential {
                base: Duration::from_secs(triage.backoff_secs),
                max: Duration::from_secs(triage.backoff_max_secs.max(triage.backoff_secs)),
            },
            "none" => BackoffPolicy::none(),
            _ => {
                return Err(ConfigValidationError::UnknownValue {
                    field: "triage.backoff".to_string(),
                    value: triage.backoff.clone(),
                    expected: "fixed, exponential, none",
                });
            }
        };

        let mut params = TriageParams::default()
            .with_backoff(backoff)
            .with_related_error_limit(triage.related_error_limit);
        params.terminal_priority = triage.terminal_priority;
        Ok(params)
    }

    fn pipeline_params(&self) -> Result<PipelineParams, ConfigValidationError> {
        let enhancement = &self.enhancement;
        if enhancement.min_successes == 0 {
            return Err(ConfigValidationError::Zero {
                field: "enhancement.min_successes",
            });
        }

        let mut params = PipelineParams {
            process_interval: secs(
                enhancement.process_interval_secs,
                "enhancement.process_interval_secs",
            )?,
            safety_scan_interval: secs(
                enhancement.safety_scan_interval_secs,
                "enhancement.safety_scan_interval_secs",
            )?,
            pattern_learning_interval: secs(
                enhancement.pattern_learning_interval_secs,
                "enhancement.pattern_learning_interval_secs",
            )?,
            ..PipelineParams::default()
        }
        .with_min_successes(enhancement.min_successes);

        for rule in &enhancement.rules {
            params = params.with_rule(rule.to_safety_rule()?);
        }
        Ok(params)
    }
}

impl FileSafetyRule {
    /// Convert to a domain rule, checking the pattern compiles.
    pub fn to_safety_rule(&self) -> Result<SafetyRule, ConfigValidationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyRuleName);
        }
        regex::Regex::new(&self.pattern).map_err(|e| ConfigValidationError::InvalidRulePattern {
            rule: self.name.clone(),
            message: e.to_string(),
        })?;

        let severity = self.severity.parse::<Severity>().map_err(|_| {
            ConfigValidationError::UnknownValue {
                field: format!("enhancement.rules.{}.severity", self.name),
                value: self.severity.clone(),
                expected: "low, medium, high, critical",
            }
        })?;
        let kinds = self
            .applies_to
            .iter()
            .map(|k| {
                k.parse::<EnhancementKind>()
                    .map_err(|_| ConfigValidationError::UnknownValue {
                        field: format!("enhancement.rules.{}.applies_to", self.name),
                        value: k.clone(),
                        expected: "component, model, file, dependency, optimization",
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rule = SafetyRule::new(self.name.clone(), self.pattern.clone())
            .for_kinds(kinds)
            .with_severity(severity)
            .with_description(self.description.clone());
        Ok(if self.active { rule } else { rule.inactive() })
    }
}

fn secs(value: u64, field: &'static str) -> Result<Duration, ConfigValidationError> {
    if value == 0 {
        return Err(ConfigValidationError::Zero { field });
    }
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[registry]
health_check_interval_secs = 10
heartbeat_timeout_secs = 20
selection_policy = "first_registered"

[communication]
quality_threshold = 0.8
max_optimization_attempts = 5

[triage]
backoff = "exponential"
backoff_secs = 1
backoff_max_secs = 8
related_error_limit = 3

[enhancement]
min_successes = 2

[[enhancement.rules]]
name = "no-shell"
pattern = "rm -rf"
applies_to = ["file"]
severity = "critical"

[store]
enabled = false
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let forge = config.to_forge_config().unwrap();

        assert_eq!(forge.registry.heartbeat_timeout, Duration::from_secs(20));
        assert_eq!(
            forge.registry.selection_policy,
            SelectionPolicy::FirstRegistered
        );
        assert_eq!(forge.communication.max_optimization_attempts, 5);
        assert_eq!(
            forge.triage.backoff.delay_for(5),
            Duration::from_secs(8)
        );
        assert_eq!(forge.triage.related_error_limit, 3);
        assert_eq!(forge.pipeline.min_successes_for_safe_pattern, 2);
        assert_eq!(forge.pipeline.rules.len(), 1);
        assert_eq!(forge.pipeline.rules[0].severity, Severity::Critical);
        assert_eq!(forge.pipeline.rules[0].applies_to, vec![EnhancementKind::File]);
        assert!(!config.store.enabled);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: FileConfig = toml::from_str("[triage]\nbackoff_secs = 1\n").unwrap();
        let forge = config.to_forge_config().unwrap();

        assert_eq!(
            forge.triage.backoff,
            BackoffPolicy::Fixed {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(forge.triage.terminal_priority, 10);
        assert_eq!(forge.registry.health_check_interval, Duration::from_secs(30));
        assert_eq!(forge.communication.quality_threshold, 0.7);
    }

    #[test]
    fn test_validate_zero_interval() {
        let config: FileConfig =
            toml::from_str("[registry]\nheartbeat_timeout_secs = 0\n").unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::Zero {
                field: "registry.heartbeat_timeout_secs"
            })
        );
    }

    #[test]
    fn test_validate_quality_threshold() {
        let config: FileConfig =
            toml::from_str("[communication]\nquality_threshold = 1.5\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::QualityThreshold(_))
        ));
    }

    #[test]
    fn test_validate_unknown_policy() {
        let config: FileConfig =
            toml::from_str("[registry]\nselection_policy = \"random\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registry.selection_policy"));
    }

    #[test]
    fn test_validate_bad_rule_pattern() {
        let toml_str = r#"
[[enhancement.rules]]
name = "broken"
pattern = "(unclosed"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidRulePattern { .. })
        ));
    }

    #[test]
    fn test_inactive_rule_is_kept_inactive() {
        let rule = FileSafetyRule {
            name: "off".to_string(),
            pattern: ".*".to_string(),
            applies_to: Vec::new(),
            severity: "low".to_string(),
            active: false,
            description: String::new(),
        };
        let rule = rule.to_safety_rule().unwrap();
        assert!(!rule.active);
        assert_eq!(rule.severity, Severity::Low);
    }
}
