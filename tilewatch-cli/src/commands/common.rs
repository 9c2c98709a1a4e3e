//! Common helpers shared across CLI commands.

use std::path::Path;

use tilewatch::config::TilewatchConfig;

use crate::error::CliError;

/// Load configuration from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<TilewatchConfig, CliError> {
    match path {
        Some(path) => Ok(TilewatchConfig::load(path)?),
        None => Ok(TilewatchConfig::default()),
    }
}
