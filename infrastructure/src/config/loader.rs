//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "agent-forge";
const PROJECT_FILES: [&str; 2] = ["forge.toml", ".forge.toml"];
const ENV_PREFIX: &str = "FORGE_";

/// Where a configuration layer comes from and whether it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSource {
    pub label: &'static str,
    pub path: Option<PathBuf>,
    pub found: bool,
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `FORGE_*` environment variables (`FORGE_TRIAGE__BACKOFF_SECS=1`)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./forge.toml` or `./.forge.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/agent-forge/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, Box<figment::Error>> {
        let global = Self::global_config_path();
        let project = Self::project_config_path();
        Self::figment(global.as_deref(), project.as_deref(), config_path)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Load from explicit file layers only, without environment variables.
    pub fn load_files(
        global: Option<&Path>,
        project: Option<&Path>,
        explicit: Option<&Path>,
    ) -> Result<FileConfig, Box<figment::Error>> {
        Self::figment(global, project, explicit)
            .extract()
            .map_err(Box::new)
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    fn figment(global: Option<&Path>, project: Option<&Path>, explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // A missing explicit file is an error, not a skipped layer
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file_exact(path));
        }

        figment
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Config file locations in priority order, for `agent-forge config`.
    pub fn sources(config_path: Option<&Path>) -> Vec<ConfigSource> {
        let mut sources = Vec::new();

        if let Some(path) = config_path {
            sources.push(ConfigSource {
                label: "Explicit",
                found: path.exists(),
                path: Some(path.to_path_buf()),
            });
        }

        let project = Self::project_config_path();
        sources.push(ConfigSource {
            label: "Project",
            found: project.is_some(),
            path: project,
        });

        let global = Self::global_config_path();
        sources.push(ConfigSource {
            label: "Global",
            found: global.as_ref().is_some_and(|p| p.exists()),
            path: global,
        });

        sources.push(ConfigSource {
            label: "Default",
            path: None,
            found: true,
        });
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config, FileConfig::default());
        assert!(config.enhancement.rules.is_empty());
        assert!(config.store.enabled);
    }

    #[test]
    fn test_global_config_path_returns_some() {
        // Should return a path (even if file doesn't exist)
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains(APP_DIR));
    }

    #[test]
    fn test_layers_merge_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(
            dir.path(),
            "global.toml",
            "[triage]\nbackoff_secs = 9\nrelated_error_limit = 2\n\n[registry]\nheartbeat_timeout_secs = 90\n",
        );
        let project = write(dir.path(), "forge.toml", "[triage]\nbackoff_secs = 3\n");
        let explicit = write(dir.path(), "explicit.toml", "[registry]\nheartbeat_timeout_secs = 15\n");

        let config =
            ConfigLoader::load_files(Some(&global), Some(&project), Some(&explicit)).unwrap();

        assert_eq!(config.triage.backoff_secs, 3);
        assert_eq!(config.triage.related_error_limit, 2);
        assert_eq!(config.registry.heartbeat_timeout_secs, 15);
        assert_eq!(config.communication.max_optimization_attempts, 3);

        let forge = config.to_forge_config().unwrap();
        assert_eq!(forge.registry.heartbeat_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_missing_optional_layers_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let config = ConfigLoader::load_files(Some(&missing), Some(&missing), None).unwrap();

        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(ConfigLoader::load_files(None, None, Some(&missing)).is_err());
    }

    #[test]
    fn test_invalid_toml_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.toml", "[triage]\nbackoff_secs = \"soon\"\n");
        assert!(ConfigLoader::load_files(None, None, Some(&bad)).is_err());
    }

    #[test]
    fn test_sources_end_with_defaults() {
        let sources = ConfigLoader::sources(None);
        let last = sources.last().unwrap();
        assert_eq!(last.label, "Default");
        assert!(last.found);
    }
}
