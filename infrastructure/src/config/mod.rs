//! Configuration file loading for agent-forge
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `FORGE_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./forge.toml` or `./.forge.toml`
//! 4. Global: `$XDG_CONFIG_HOME/agent-forge/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileCommunicationConfig, FileConfig, FileEnhancementConfig,
    FileRegistryConfig, FileSafetyRule, FileStoreConfig, FileTriageConfig,
};
pub use loader::{ConfigLoader, ConfigSource};
