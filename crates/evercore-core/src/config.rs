//! Layered configuration for the synchronizer: sync tunables, retry policy,
//! conflict defaults, logging, auth, and storage locations.
//!
//! Mirrors this lineage's `serde_yaml` + builder + `validate()` pattern: a
//! `Config` with `Default` sub-sections, `load`/`load_or_default`, and a
//! fluent `ConfigBuilder`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A single validation failure; `validate()` returns all of them rather than
/// failing on the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Chunk page size requested from `getSyncChunk`.
    pub max_entries_per_chunk: u32,
    /// Semaphore size bounding concurrent full-note/full-resource fetches.
    pub max_in_flight_downloads: usize,
    /// Whether to download note thumbnails during sync.
    pub download_note_thumbnails: bool,
    /// Directory to store ink note images; `None` disables the fetch.
    pub ink_note_images_storage_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_entries_per_chunk: 200,
            max_in_flight_downloads: 100,
            download_note_thumbnails: true,
            ink_note_images_storage_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub base_delay_millis: u64,
    pub max_retries: u32,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_millis: 500,
            max_retries: 3,
            exponential_backoff: true,
        }
    }
}

/// Default per-category conflict resolution, used when no interactive
/// resolver is configured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultConflictStrategy {
    UseTheirs,
    UseMine,
    MoveMine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictConfig {
    pub default_strategy: DefaultConflictStrategy,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            default_strategy: DefaultConflictStrategy::MoveMine,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub app_name: String,
    pub oauth_client_id: Option<String>,
    pub callback_port: u16,
    pub keychain_service: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_name: "evercore".to_string(),
            oauth_client_id: None,
            callback_port: 8401,
            keychain_service: "evercore-sync".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.local/share/evercore"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub conflicts: ConflictConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Default config file path, following `dirs::config_dir()/evercore/config.yaml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("evercore").join("config.yaml"))
    }

    /// Load from an explicit path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `default_path()`, falling back to `Config::default()` if
    /// the file is absent.
    pub fn load_or_default() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate cross-field and range constraints; does not fail fast.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.sync.max_in_flight_downloads == 0 {
            errors.push(ValidationError {
                field: "sync.max_in_flight_downloads".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.sync.max_entries_per_chunk == 0 {
            errors.push(ValidationError {
                field: "sync.max_entries_per_chunk".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.retry.max_retries == 0 {
            errors.push(ValidationError {
                field: "retry.max_retries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.auth.keychain_service.is_empty() {
            errors.push(ValidationError {
                field: "auth.keychain_service".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".to_string(),
                message: format!("must be one of {valid_levels:?}"),
            });
        }

        errors
    }
}

/// Fluent builder mirroring this lineage's config-builder idiom.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_in_flight_downloads(mut self, n: usize) -> Self {
        self.config.sync.max_in_flight_downloads = n;
        self
    }

    #[must_use]
    pub fn max_entries_per_chunk(mut self, n: u32) -> Self {
        self.config.sync.max_entries_per_chunk = n;
        self
    }

    #[must_use]
    pub fn default_conflict_strategy(mut self, strategy: DefaultConflictStrategy) -> Self {
        self.config.conflicts.default_strategy = strategy;
        self
    }

    #[must_use]
    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    #[must_use]
    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }

    /// Builds and validates; fails if any `ValidationError` was produced.
    pub fn build_validated(self) -> anyhow::Result<Config> {
        let config = self.config;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("invalid configuration: {joined}")
        }
    }
}
