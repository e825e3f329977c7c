//! Layered configuration
//!
//! Defaults, then a TOML file, then `CANVAS_*` environment overrides. The CLI
//! applies its flags last.

use std::path::{Path, PathBuf};

use canvas_engine::{AdapterConfig, AdapterPreference, MockConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::limits::LimitsConfig;
use crate::orchestrator::RunConfig;
use crate::preview::PreviewConfig;

/// Adapter preference override
pub const ENV_ADAPTER: &str = "CANVAS_ADAPTER";
/// Live backend base URL override
pub const ENV_BASE_URL: &str = "CANVAS_BASE_URL";
/// Storage directory override
pub const ENV_STORAGE_DIR: &str = "CANVAS_STORAGE_DIR";

/// Where canvas state is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per key
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".canvas"),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Adapter selection and live backend
    pub adapter: AdapterConfig,
    /// Mock engine
    pub mock: MockConfig,
    /// Results runs
    pub run: RunConfig,
    /// Preview runs
    pub preview: PreviewConfig,
    /// Limits fetcher
    pub limits: LimitsConfig,
    /// Persistence
    pub storage: StorageConfig,
}

impl CanvasConfig {
    /// Parse a TOML document; missing sections take defaults
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on invalid TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Read` if the file is unreadable
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` for an unknown adapter preference
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply overrides looked up through `lookup`; blank values are ignored
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` for an unknown adapter preference
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_ADAPTER) {
            self.adapter.preference = value
                .parse::<AdapterPreference>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_ADAPTER,
                    value,
                })?;
        }
        if let Some(value) = get(ENV_BASE_URL) {
            self.adapter.base_url = Some(value);
        }
        if let Some(value) = get(ENV_STORAGE_DIR) {
            self.storage.dir = PathBuf::from(value);
        }
        Ok(self)
    }

    /// Override the adapter preference
    #[inline]
    #[must_use]
    pub fn with_preference(mut self, preference: AdapterPreference) -> Self {
        self.adapter.preference = preference;
        self
    }

    /// Override the live base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.adapter.base_url = Some(base_url.into());
        self
    }

    /// Override the storage directory
    #[inline]
    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.dir = dir.into();
        self
    }
}
