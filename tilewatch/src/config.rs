//! INI configuration.
//!
//! ```ini
//! [callbacks]
//! ; reject | allow
//! duplicate_policy = reject
//!
//! [dispatch]
//! coalesce_removals = true
//! ; 0 = unlimited
//! max_events_per_pass = 0
//!
//! [logging]
//! ; used when RUST_LOG is not set
//! level = info
//! ; optional, enables a daily log file
//! directory = /var/log/tilewatch
//! ```
//!
//! Missing sections and keys fall back to defaults. Unknown keys are ignored.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::terrain::{DispatcherConfig, DuplicatePolicy, TerrainOptions};

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("invalid INI syntax: {0}")]
    Parse(String),

    /// A key holds a value that cannot be interpreted.
    #[error("invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Complete configuration for a terrain and its host process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TilewatchConfig {
    pub duplicate_policy: DuplicatePolicy,
    pub dispatch: DispatcherConfig,
    pub logging: LoggingConfig,
}

impl TilewatchConfig {
    /// Load configuration from an INI file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(value) = get(&ini, "callbacks", "duplicate_policy") {
            config.duplicate_policy = DuplicatePolicy::from_config_str(value)
                .ok_or_else(|| invalid("callbacks", "duplicate_policy", value))?;
        }

        if let Some(value) = get(&ini, "dispatch", "coalesce_removals") {
            config.dispatch.coalesce_removals = parse_bool(value)
                .ok_or_else(|| invalid("dispatch", "coalesce_removals", value))?;
        }
        if let Some(value) = get(&ini, "dispatch", "max_events_per_pass") {
            config.dispatch.max_events_per_pass = value
                .parse()
                .map_err(|_| invalid("dispatch", "max_events_per_pass", value))?;
        }

        if let Some(value) = get(&ini, "logging", "level") {
            config.logging.level = value.to_string();
        }
        if let Some(value) = get(&ini, "logging", "directory") {
            config.logging.directory = Some(PathBuf::from(value));
        }

        Ok(config)
    }

    /// Options for building a [`crate::terrain::Terrain`].
    pub fn terrain_options(&self) -> TerrainOptions {
        TerrainOptions {
            duplicate_policy: self.duplicate_policy,
            dispatcher: self.dispatch.clone(),
        }
    }
}

/// Non-empty, trimmed value for `[section] key`.
fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(section: &'static str, key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section,
        key,
        value: value.to_string(),
    }
}
