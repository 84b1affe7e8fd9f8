//! Store configuration.
//!
//! Configuration comes from a TOML file or from `ASPEN_TUPLE_*` environment
//! variables. Missing values fall back to the defaults below.

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;

use crate::constants::DEFAULT_SCAN_BATCH_SIZE;
use crate::constants::MAX_SCAN_BATCH_SIZE;

/// Environment variable selecting the backend.
pub const ENV_BACKEND: &str = "ASPEN_TUPLE_BACKEND";
/// Environment variable holding the redb database path.
pub const ENV_PATH: &str = "ASPEN_TUPLE_PATH";
/// Environment variable overriding the scan batch size.
pub const ENV_SCAN_BATCH_SIZE: &str = "ASPEN_TUPLE_SCAN_BATCH_SIZE";
/// Environment variable setting the default operation timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "ASPEN_TUPLE_TIMEOUT_MS";

/// Default values for configuration
mod defaults {
    use super::BackendKind;
    use crate::constants::DEFAULT_SCAN_BATCH_SIZE;

    pub fn backend() -> BackendKind {
        BackendKind::Memory
    }

    pub fn scan_batch_size() -> u32 {
        DEFAULT_SCAN_BATCH_SIZE
    }
}

/// Configuration error types
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue {
        /// Setting name.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required configuration value is missing.
    #[snafu(display("missing required configuration: {key} ({hint})"))]
    MissingRequired {
        /// Setting name.
        key: String,
        /// How to provide it.
        hint: String,
    },

    /// The configuration file could not be read or written.
    #[snafu(display("config file {}: {source}", path.display()))]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[snafu(display("failed to parse TOML: {source}"))]
    Parse {
        /// The underlying TOML error.
        source: toml::de::Error,
    },

    /// The configuration could not be serialized.
    #[snafu(display("failed to serialize config: {source}"))]
    Serialize {
        /// The underlying TOML error.
        source: toml::ser::Error,
    },
}

/// Which storage engine backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process sorted map, lost on exit.
    Memory,
    /// Embedded redb database file.
    Redb,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redb" => Ok(BackendKind::Redb),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_BACKEND.to_string(),
                value: s.to_string(),
                reason: "must be 'memory' or 'redb'".to_string(),
            }),
        }
    }
}

/// Tuple store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage engine.
    #[serde(default = "defaults::backend")]
    pub backend: BackendKind,
    /// Database file, required for [`BackendKind::Redb`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Rows fetched per page by paged cursors.
    #[serde(default = "defaults::scan_batch_size")]
    pub scan_batch_size: u32,
    /// Deadline applied to contexts created by `TupleStore::context`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: defaults::backend(),
            path: None,
            scan_batch_size: defaults::scan_batch_size(),
            default_timeout_ms: None,
        }
    }
}

impl StoreConfig {
    /// In-memory configuration.
    pub fn memory() -> Self {
        Self::default()
    }

    /// redb configuration for the file at `path`.
    pub fn redb(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Redb,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup(ENV_BACKEND) {
            Some(value) => value.parse()?,
            None => defaults::backend(),
        };
        let scan_batch_size = match lookup(ENV_SCAN_BATCH_SIZE) {
            Some(value) => parse_number(ENV_SCAN_BATCH_SIZE, &value)?,
            None => DEFAULT_SCAN_BATCH_SIZE,
        };
        let default_timeout_ms = lookup(ENV_TIMEOUT_MS).map(|value| parse_number(ENV_TIMEOUT_MS, &value)).transpose()?;

        let config = Self {
            backend,
            path: lookup(ENV_PATH).map(PathBuf::from),
            scan_batch_size,
            default_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(IoSnafu { path })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).context(ParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).context(SerializeSnafu)
    }

    /// Write the configuration to a TOML file.
    pub fn save_to_toml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml_string()?).context(IoSnafu { path })
    }

    /// Default timeout, if configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_batch_size == 0 || self.scan_batch_size > MAX_SCAN_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "scan_batch_size".to_string(),
                value: self.scan_batch_size.to_string(),
                reason: format!("must be between 1 and {MAX_SCAN_BATCH_SIZE}"),
            });
        }
        if self.default_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "default_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "must be positive; omit it for no timeout".to_string(),
            });
        }
        if self.backend == BackendKind::Redb {
            if !cfg!(feature = "redb") {
                return Err(ConfigError::InvalidValue {
                    key: "backend".to_string(),
                    value: "redb".to_string(),
                    reason: "crate built without the 'redb' feature".to_string(),
                });
            }
            if self.path.is_none() {
                return Err(ConfigError::MissingRequired {
                    key: "path".to_string(),
                    hint: format!("set {ENV_PATH} or 'path' in the config file"),
                });
            }
        }
        Ok(())
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: format!("must be a non-negative integer: {e}"),
    })
}
