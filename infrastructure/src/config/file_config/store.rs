//! Audit store configuration from TOML (`[store]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw store configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Write audit records to a JSONL file; otherwise keep them in memory
    pub enabled: bool,
    /// JSONL path; defaults to the platform data directory
    pub path: Option<String>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl FileStoreConfig {
    /// Resolve the store file path.
    ///
    /// Falls back to `$XDG_DATA_HOME/agent-forge/audit.jsonl`, or
    /// `./.forge/audit.jsonl` when no data directory is known.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return PathBuf::from(path);
        }
        dirs::data_dir()
            .map(|d| d.join("agent-forge"))
            .unwrap_or_else(|| PathBuf::from(".forge"))
            .join("audit.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let config = FileStoreConfig {
            enabled: true,
            path: Some("/tmp/forge.jsonl".to_string()),
        };
        assert_eq!(config.resolved_path(), PathBuf::from("/tmp/forge.jsonl"));
    }

    #[test]
    fn test_default_path_is_named_audit() {
        let path = FileStoreConfig::default().resolved_path();
        assert!(path.ends_with("audit.jsonl"));
    }
}
