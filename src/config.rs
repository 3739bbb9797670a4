//! Preview runtime configuration.
//!
//! Loaded from TOML (`preview.toml` in the platform config directory by
//! default). Every field has a default, so an empty or missing file yields a
//! working configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "preview.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level preview configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PreviewConfig {
    /// Package manager binary used for install and start commands.
    pub package_manager: String,
    /// Arguments for the install command.
    pub install_args: Vec<String>,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Bounds for the entry-point directory walk.
    pub walk: WalkConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            package_manager: "npm".to_string(),
            install_args: vec!["install".to_string()],
            log_filter: "info".to_string(),
            walk: WalkConfig::default(),
        }
    }
}

/// Bounds for the breadth-first `index.html` search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WalkConfig {
    /// Deepest directory level descended into (root is 0).
    pub max_depth: usize,
    /// Maximum number of directory entries examined.
    pub max_entries: usize,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_entries: 2_000,
            skip_dirs: vec!["node_modules".to_string(), ".git".to_string()],
        }
    }
}

impl PreviewConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// `<config dir>/zerobuild/preview.toml` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "zerobuild", "zerobuild")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// JSON Schema for the configuration file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(PreviewConfig)).unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.package_manager.trim().is_empty() {
            return Err(ConfigError::Invalid("package_manager must not be empty".into()));
        }
        if self.walk.max_entries == 0 {
            return Err(ConfigError::Invalid("walk.max_entries must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PreviewConfig::from_toml_str("").unwrap();
        assert_eq!(config, PreviewConfig::default());
        assert_eq!(config.package_manager, "npm");
        assert_eq!(config.install_args, vec!["install"]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PreviewConfig::from_toml_str(
            r#"
package_manager = "pnpm"

[walk]
max_depth = 3
"#,
        )
        .unwrap();

        assert_eq!(config.package_manager, "pnpm");
        assert_eq!(config.walk.max_depth, 3);
        assert_eq!(config.walk.max_entries, WalkConfig::default().max_entries);
        assert_eq!(config.install_args, vec!["install"]);
    }

    #[test]
    fn rejects_empty_package_manager() {
        let err = PreviewConfig::from_toml_str("package_manager = \"  \"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PreviewConfig::from_toml_str("package_manager = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = PreviewConfig::load_or_default(&tmp.path().join("preview.toml")).unwrap();
        assert_eq!(config, PreviewConfig::default());
    }

    #[test]
    fn loads_file_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("preview.toml");
        std::fs::write(&path, "install_args = [\"ci\"]\n").unwrap();

        let config = PreviewConfig::load(&path).unwrap();
        assert_eq!(config.install_args, vec!["ci"]);
    }

    #[test]
    fn schema_lists_sections() {
        let schema = PreviewConfig::json_schema();
        let properties = &schema["properties"];
        assert!(properties.get("package_manager").is_some());
        assert!(properties.get("walk").is_some());
    }
}
