//! Terrain graph abstraction.
//!
//! The live terrain graph belongs to the rendering engine. This crate never
//! traverses or owns it; it only asks it for elevations through the
//! [`TerrainGraph`] trait and hands its tiles to listeners as opaque
//! [`TileHandle`]s.
//!
//! [`TileGraph`] is an in-memory implementation used by the simulator and by
//! tests. Engines provide their own.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilewatch::graph::{Tile, TileGraph, TerrainGraph};
//! use tilewatch::profile::MapProfile;
//!
//! let profile = Arc::new(MapProfile::global_geodetic());
//! let graph = TileGraph::new(Arc::clone(&profile));
//! graph.insert(Tile::flat(key, 3, 3, 120.0)?);
//!
//! let hae = graph.sample_elevation(10.0, 53.5);
//! let frozen = graph.snapshot(); // safe to query while `graph` keeps changing
//! ```

mod tile;
mod tile_graph;

use std::sync::Arc;

pub use tile::{Tile, TileError, TileHandle};
pub use tile_graph::{TileGraph, TileGraphSnapshot};

/// Engine-provided elevation source.
///
/// Coordinates are in the profile's spatial reference. Results are heights
/// above the ellipsoid in meters.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: height queries run on arbitrary
/// threads while loaders mutate the live graph.
pub trait TerrainGraph: Send + Sync {
    /// Elevation above the ellipsoid at a point, or `None` where no terrain
    /// is loaded.
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64>;

    /// An immutable copy of the current graph, if the engine supports it.
    fn detach(&self) -> Option<Arc<dyn TerrainGraph>> {
        None
    }
}

/// Shared, dynamically dispatched graph.
pub type SharedTerrainGraph = Arc<dyn TerrainGraph>;
