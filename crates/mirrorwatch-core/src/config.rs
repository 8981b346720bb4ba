//! Configuration module for mirrorwatch.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, first-run bootstrap, and a builder for programmatic use.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::WatchDefinition;

/// Environment variable that overrides [`Config::default_path`].
pub const CONFIG_PATH_ENV: &str = "MIRRORWATCH_CONFIG";

/// Header written above a freshly bootstrapped configuration file.
const BOOTSTRAP_HEADER: &str = "\
# mirrorwatch configuration
#
# Each entry under `watches` mirrors one source tree into one destination tree.
# Replace the example paths with real directories and restart mirrorwatchd.
";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for mirrorwatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Mirroring rules, in the order they were declared.
    #[serde(default)]
    pub watches: Vec<WatchDefinition>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors raised while loading or bootstrapping the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of [`Config::load_or_bootstrap`].
#[derive(Debug)]
pub enum ConfigSource {
    /// An existing file was loaded and validated.
    Loaded(Config),
    /// No file existed; an example was written to this path.
    Created(PathBuf),
}

// ---------------------------------------------------------------------------
// Loading, saving, bootstrap
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Write this configuration to `path` as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_yaml::to_string(self).map_err(ConfigError::Serialize)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, format!("{BOOTSTRAP_HEADER}{body}")).map_err(write_err)
    }

    /// Load and validate the file at `path`, or write [`Config::example`]
    /// there if nothing exists yet.
    ///
    /// A freshly created file is not loaded: the caller is expected to stop
    /// and let the operator fill in real paths.
    pub fn load_or_bootstrap(path: &Path) -> Result<ConfigSource, ConfigError> {
        let exists = path.try_exists().map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if !exists {
            Self::example().save(path)?;
            return Ok(ConfigSource::Created(path.to_path_buf()));
        }

        let config = Self::load(path)?;
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(ConfigSource::Loaded(config))
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// `$MIRRORWATCH_CONFIG` wins when set; otherwise typically
    /// `$XDG_CONFIG_HOME/mirrorwatch/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mirrorwatch")
            .join("config.yaml")
    }

    /// Two-entry example written on first run: one filtered definition and
    /// one that mirrors every file.
    pub fn example() -> Self {
        ConfigBuilder::new()
            .watch(
                WatchDefinition::new("/path/to/source1", "/path/to/dest1")
                    .with_extensions([".txt", ".log"]),
            )
            .watch(WatchDefinition::new("/path/to/source2", "/path/to/dest2"))
            .build()
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"watches[0].source_root"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Whether the roots
    /// exist on disk is not checked here; that happens per definition when
    /// the watches start, so one bad entry does not block the others.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- watches ---
        for (i, watch) in self.watches.iter().enumerate() {
            if watch.source_root.as_os_str().is_empty() {
                errors.push(ValidationError {
                    field: format!("watches[{i}].source_root"),
                    message: "must not be empty".into(),
                });
            }
            if watch.destination_root.as_os_str().is_empty() {
                errors.push(ValidationError {
                    field: format!("watches[{i}].destination_root"),
                    message: "must not be empty".into(),
                });
            }
            let blank_extension = watch
                .extensions
                .iter()
                .flatten()
                .any(|ext| ext.trim().trim_start_matches('.').is_empty());
            if blank_extension {
                errors.push(ValidationError {
                    field: format!("watches[{i}].extensions"),
                    message: "entries must name an extension, e.g. \".txt\"".into(),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// # Example
///
/// ```rust,no_run
/// use mirrorwatch_core::config::ConfigBuilder;
/// use mirrorwatch_core::domain::WatchDefinition;
///
/// let config = ConfigBuilder::new()
///     .logging_level("debug")
///     .watch(WatchDefinition::new("/srv/build/out", "/mnt/share/out"))
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    /// Append a watch definition.
    pub fn watch(mut self, definition: WatchDefinition) -> Self {
        self.config.watches.push(definition);
        self
    }

    /// Consume the builder and return the configuration without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the configuration or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}
