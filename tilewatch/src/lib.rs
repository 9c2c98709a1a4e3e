//! Tilewatch - tile notifications and height queries for live terrain
//!
//! This library lets external code observe tile-loading activity in a live
//! terrain graph and sample elevations against it, without owning the graph
//! or knowing how the engine loads tiles.
//!
//! # Modules
//!
//! - [`terrain`]: the [`Terrain`](terrain::Terrain) handle, listener registry,
//!   deferred notification dispatcher and height resolvers
//! - [`graph`]: the engine-facing [`TerrainGraph`](graph::TerrainGraph) trait
//!   and an in-memory [`TileGraph`](graph::TileGraph)
//! - [`coord`] / [`profile`]: tile keys, extents and map profiles
//! - [`config`] / [`logging`]: INI configuration and tracing bootstrap
//! - [`metrics`]: dispatcher counters

pub mod config;
pub mod coord;
pub mod error;
pub mod graph;
pub mod logging;
pub mod metrics;
pub mod profile;
pub mod terrain;

pub use error::{Result, TilewatchError};
