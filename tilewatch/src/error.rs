//! Crate-level error type.
//!
//! Runtime notification and query paths never return errors: stale
//! listeners are unregistered, missing terrain is `None`, and listener panics
//! are logged. Errors only arise while building things.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coord::TileKeyError;
use crate::graph::TileError;
use crate::logging::LoggingError;
use crate::profile::ProfileError;

/// Any error produced while setting up a terrain.
#[derive(Debug, Error)]
pub enum TilewatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    TileKey(#[from] TileKeyError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}

/// Result alias using [`TilewatchError`].
pub type Result<T> = std::result::Result<T, TilewatchError>;
