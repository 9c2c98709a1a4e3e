//! CLI error type.

use std::fmt;

use tilewatch::config::ConfigError;
use tilewatch::logging::LoggingError;
use tilewatch::TilewatchError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    Config(String),
    /// Logging could not be initialized.
    Logging(String),
    /// Invalid command-line arguments.
    Args(String),
    /// The simulation failed.
    Simulate(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Args(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Simulate(msg) => write!(f, "Simulation failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<TilewatchError> for CliError {
    fn from(e: TilewatchError) -> Self {
        CliError::Simulate(e.to_string())
    }
}
