//! Height queries against the live graph or a detached patch.

use std::sync::Arc;

use tracing::trace;

use crate::graph::{SharedTerrainGraph, TerrainGraph};
use crate::profile::{MapProfile, SpatialReference};

/// Elevation at a point, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightSample {
    /// Height above mean sea level, per the profile's vertical datum.
    pub above_msl: f64,
    /// Height above the reference ellipsoid.
    pub above_ellipsoid: f64,
}

/// Elevation query surface.
///
/// Every query is read-only. `None` means no terrain is available at that
/// point: outside loaded tiles, not representable in the profile's
/// coordinate system, or the graph is gone.
pub trait TerrainResolver {
    /// Query this resolver's own graph.
    fn get_height(&self, srs: SpatialReference, x: f64, y: f64) -> Option<HeightSample>;

    /// Query a specific detached patch instead.
    fn get_height_in(
        &self,
        patch: &TerrainPatch,
        srs: SpatialReference,
        x: f64,
        y: f64,
    ) -> Option<HeightSample> {
        patch.get_height(srs, x, y)
    }
}

/// An immutable subgraph captured at a point in time.
///
/// Queries against a patch never touch the live graph, so they may run on
/// any thread while loaders keep changing it.
#[derive(Clone)]
pub struct TerrainPatch {
    profile: Arc<MapProfile>,
    graph: SharedTerrainGraph,
}

impl TerrainPatch {
    /// Bind a patch to `graph`, interpreted in `profile`.
    ///
    /// The caller guarantees `graph` is not mutated afterward.
    pub fn new(profile: Arc<MapProfile>, graph: SharedTerrainGraph) -> Self {
        Self { profile, graph }
    }

    pub fn profile(&self) -> &Arc<MapProfile> {
        &self.profile
    }

    pub fn graph(&self) -> &SharedTerrainGraph {
        &self.graph
    }
}

impl TerrainResolver for TerrainPatch {
    fn get_height(&self, srs: SpatialReference, x: f64, y: f64) -> Option<HeightSample> {
        resolve_height(&self.profile, self.graph.as_ref(), srs, x, y)
    }
}

impl std::fmt::Debug for TerrainPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainPatch")
            .field("srs", &self.profile.srs())
            .finish_non_exhaustive()
    }
}

/// Transform the point into the profile and sample the graph.
pub(crate) fn resolve_height(
    profile: &MapProfile,
    graph: &dyn TerrainGraph,
    srs: SpatialReference,
    x: f64,
    y: f64,
) -> Option<HeightSample> {
    let Some((px, py)) = srs.transform_to(profile.srs(), x, y) else {
        trace!(%srs, x, y, "Height query point not representable in profile");
        return None;
    };
    let above_ellipsoid = graph.sample_elevation(px, py)?;
    Some(HeightSample {
        above_msl: profile.vertical_datum().to_msl(above_ellipsoid),
        above_ellipsoid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileKey;
    use crate::graph::{Tile, TileGraph};
    use crate::profile::VerticalDatum;

    fn patch_with_tile(height: f32, datum: VerticalDatum) -> TerrainPatch {
        let profile = Arc::new(MapProfile::global_geodetic().with_vertical_datum(datum));
        let graph = TileGraph::new(Arc::clone(&profile));
        graph.insert(Tile::flat(TileKey::new(0, 1, 0), 2, 2, height).unwrap());
        TerrainPatch::new(profile, Arc::new(graph.snapshot()))
    }

    #[test]
    fn test_patch_height_found() {
        let patch = patch_with_tile(500.0, VerticalDatum::Ellipsoid);
        let sample = patch
            .get_height(SpatialReference::Geographic, 10.0, 45.0)
            .unwrap();
        assert_eq!(sample.above_ellipsoid, 500.0);
        assert_eq!(sample.above_msl, 500.0);
    }

    #[test]
    fn test_patch_height_applies_datum() {
        let patch = patch_with_tile(
            500.0,
            VerticalDatum::GeoidOffset {
                name: "test".to_string(),
                undulation_m: 47.5,
            },
        );
        let sample = patch
            .get_height(SpatialReference::Geographic, 10.0, 45.0)
            .unwrap();
        assert!((sample.above_msl - 452.5).abs() < 1e-9);
    }

    #[test]
    fn test_patch_height_outside_tiles() {
        let patch = patch_with_tile(500.0, VerticalDatum::Ellipsoid);
        assert_eq!(
            patch.get_height(SpatialReference::Geographic, -10.0, 45.0),
            None
        );
    }

    #[test]
    fn test_patch_height_from_mercator_query() {
        let patch = patch_with_tile(75.0, VerticalDatum::Ellipsoid);
        let (x, y) = crate::coord::lon_lat_to_mercator(10.0, 45.0).unwrap();
        let sample = patch
            .get_height(SpatialReference::SphericalMercator, x, y)
            .unwrap();
        assert_eq!(sample.above_ellipsoid, 75.0);
    }

    #[test]
    fn test_unrepresentable_point() {
        let patch = patch_with_tile(75.0, VerticalDatum::Ellipsoid);
        assert_eq!(
            patch.get_height(SpatialReference::Geographic, f64::INFINITY, 0.0),
            None
        );
    }

    #[test]
    fn test_get_height_in_other_patch() {
        let empty = TerrainPatch::new(
            Arc::new(MapProfile::global_geodetic()),
            Arc::new(TileGraph::new(Arc::new(MapProfile::global_geodetic())).snapshot()),
        );
        let loaded = patch_with_tile(12.0, VerticalDatum::Ellipsoid);

        assert_eq!(empty.get_height(SpatialReference::Geographic, 10.0, 45.0), None);
        let sample = empty
            .get_height_in(&loaded, SpatialReference::Geographic, 10.0, 45.0)
            .unwrap();
        assert_eq!(sample.above_ellipsoid, 12.0);
    }
}
