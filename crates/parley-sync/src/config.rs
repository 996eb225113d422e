//! Configuration loading and typed config structures for the engine.
//!
//! The canonical configuration lives in `parley-config.yaml` at the
//! deployment root. This module defines strongly-typed structs mirroring
//! the YAML structure and a loader that reads the file, with environment
//! overrides for deployment-style knobs.

use std::path::Path;

use serde::Deserialize;

use parley_types::RequestOptions;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Registration-driver settings.
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Defaults applied when a session omits request options.
    #[serde(default)]
    pub defaults: DefaultOptionsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `PARLEY_LOG_LEVEL` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.logging.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

/// Registration-driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationConfig {
    /// How many times a registration attempt may be restarted by broker
    /// recovery before giving up.
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_restart_attempts: default_max_restart_attempts(),
        }
    }
}

/// Defaults for the per-session request options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefaultOptionsConfig {
    /// Default for `client_gravatar`.
    #[serde(default)]
    pub client_gravatar: bool,

    /// Default for `include_subscribers`.
    #[serde(default = "default_true")]
    pub include_subscribers: bool,

    /// Default for `include_streams`.
    #[serde(default = "default_true")]
    pub include_streams: bool,

    /// Default for `slim_presence`.
    #[serde(default)]
    pub slim_presence: bool,
}

impl DefaultOptionsConfig {
    /// The configured defaults as a ready-to-use options value. The
    /// legacy compatibility flag is never a server-side default.
    pub const fn request_options(&self) -> RequestOptions {
        RequestOptions {
            client_gravatar: self.client_gravatar,
            include_subscribers: self.include_subscribers,
            include_streams: self.include_streams,
            slim_presence: self.slim_presence,
            legacy_subscription_flags: false,
        }
    }
}

impl Default for DefaultOptionsConfig {
    fn default() -> Self {
        Self {
            client_gravatar: false,
            include_subscribers: true,
            include_streams: true,
            slim_presence: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    /// Override the log level from the environment when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("PARLEY_LOG_LEVEL") {
            self.level = level;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_max_restart_attempts() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
