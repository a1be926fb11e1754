//! CLI configuration handling.

use anyhow::{Context, Result};
use credbroker_core::{RegistrySet, default_token_sources};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `token_sources` (comma separated).
pub const TOKEN_SOURCES_ENV: &str = "CREDBROKER_TOKEN_SOURCES";

/// Where stored credentials live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON index on disk, secrets in the OS keyring.
    #[default]
    Keyring,
    /// Everything, secrets included, in one plaintext JSON file.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Token sources to try, in order.
    pub token_sources: Vec<String>,

    /// Hosts treated as privileged in addition to the built-in GCR set.
    pub extra_registries: Vec<String>,

    /// Deadline for `gcloud auth print-access-token`, in seconds.
    pub gcloud_timeout_secs: Option<u64>,

    /// Credential storage backend.
    pub store_backend: StoreBackend,

    /// Index file (keyring backend) or credentials file (file backend).
    /// Defaults to the platform data directory.
    pub store_path: Option<PathBuf>,

    /// Logging level.
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            token_sources: default_token_sources(),
            extra_registries: Vec::new(),
            gcloud_timeout_secs: None,
            store_backend: StoreBackend::default(),
            store_path: None,
            log_level: "warn".to_string(),
            config_path: PathBuf::new(),
        }
    }
}

impl BrokerConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration")
    }

    /// Replace `token_sources` with a comma separated override, if present.
    ///
    /// Identifiers are not validated here; an unknown one fails the first
    /// lookup that reaches it.
    pub fn apply_token_sources_override(&mut self, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.token_sources = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// The privileged registry set described by this configuration.
    pub fn registries(&self) -> RegistrySet {
        RegistrySet::gcr_defaults().with_hosts(self.extra_registries.iter().cloned())
    }
}

/// Load configuration from `path`, or the default location when `None`.
///
/// A missing file yields defaults. `CREDBROKER_TOKEN_SOURCES` is applied last.
pub fn load_config(path: Option<&Path>) -> Result<BrokerConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        BrokerConfig::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        BrokerConfig::default()
    };

    config.config_path = config_path;
    config.apply_token_sources_override(std::env::var(TOKEN_SOURCES_ENV).ok().as_deref());

    Ok(config)
}

fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("credbroker.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "credbroker", "credbroker")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.token_sources, vec!["store", "gcloud_sdk"]);
        assert_eq!(config.log_level, "warn");
        assert!(config.gcloud_timeout_secs.is_none());
        assert_eq!(config.store_backend, StoreBackend::Keyring);
    }

    #[test]
    fn test_plaintext_file_backend_is_opt_in() {
        let config = BrokerConfig::from_toml_str("store_backend = \"file\"").unwrap();
        assert_eq!(config.store_backend, StoreBackend::File);

        assert!(BrokerConfig::from_toml_str("store_backend = \"plaintext\"").is_err());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = BrokerConfig::from_toml_str(
            r#"
            token_sources = ["env", "gcloud_sdk", "store"]
            extra_registries = ["mirror.gcr.io"]
            gcloud_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.token_sources, vec!["env", "gcloud_sdk", "store"]);
        assert_eq!(config.gcloud_timeout_secs, Some(10));
        assert_eq!(config.log_level, "warn");
        assert!(config.registries().is_privileged("mirror.gcr.io"));
        assert!(config.registries().is_privileged("gcr.io"));
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(BrokerConfig::from_toml_str("token_sources = \"env\"").is_err());
    }

    #[test]
    fn test_token_sources_override() {
        let mut config = BrokerConfig::default();

        config.apply_token_sources_override(Some(" env , gcloud_sdk ,"));
        assert_eq!(config.token_sources, vec!["env", "gcloud_sdk"]);

        config.apply_token_sources_override(Some("  "));
        assert_eq!(config.token_sources, vec!["env", "gcloud_sdk"]);

        config.apply_token_sources_override(None);
        assert_eq!(config.token_sources, vec!["env", "gcloud_sdk"]);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.config_path, path);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "log_level = \"debug\"\nstore_path = \"/tmp/creds.json\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/creds.json")));
    }
}
