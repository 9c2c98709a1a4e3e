//! Integration tests for height queries on live terrain and detached patches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::Rng;
use tilewatch::coord::{lon_lat_to_mercator, TileKey, MAX_LOD};
use tilewatch::graph::{Tile, TileGraph};
use tilewatch::profile::{MapProfile, SpatialReference, VerticalDatum};
use tilewatch::terrain::{Terrain, TerrainResolver};

// ============================================================================
// Helper Functions
// ============================================================================

fn geodetic_fixture() -> (Arc<TileGraph>, Terrain) {
    let profile = Arc::new(MapProfile::global_geodetic());
    let graph = Arc::new(TileGraph::new(Arc::clone(&profile)));
    let terrain = Terrain::new(profile, &graph);
    (graph, terrain)
}

/// Load both root tiles of the geodetic profile at `height`.
fn load_roots(graph: &TileGraph, height: f32) {
    graph.insert(Tile::flat(TileKey::new(0, 0, 0), 3, 3, height).unwrap());
    graph.insert(Tile::flat(TileKey::new(0, 1, 0), 3, 3, height).unwrap());
}

// ============================================================================
// Live Queries
// ============================================================================

#[test]
fn test_height_inside_loaded_tile() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 250.0);

    let sample = terrain
        .get_height(SpatialReference::Geographic, 9.99, 53.55)
        .unwrap();
    assert_eq!(sample.above_ellipsoid, 250.0);
}

#[test]
fn test_height_outside_profile_domain_is_not_found() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 250.0);

    assert_eq!(
        terrain.get_height(SpatialReference::Geographic, 0.0, 95.0),
        None
    );
    assert_eq!(
        terrain.get_height(SpatialReference::Geographic, 200.0, 0.0),
        None
    );
}

#[test]
fn test_height_with_nothing_loaded_is_not_found() {
    let (_graph, terrain) = geodetic_fixture();
    assert_eq!(
        terrain.get_height(SpatialReference::Geographic, 10.0, 50.0),
        None
    );
}

#[test]
fn test_finer_tile_wins() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 100.0);
    // Lod 1 tile (2, 0) covers lon 0..90, lat 0..90.
    graph.insert(Tile::flat(TileKey::new(1, 2, 0), 2, 2, 900.0).unwrap());

    let fine = terrain
        .get_height(SpatialReference::Geographic, 45.0, 45.0)
        .unwrap();
    let coarse = terrain
        .get_height(SpatialReference::Geographic, -45.0, 45.0)
        .unwrap();
    assert_eq!(fine.above_ellipsoid, 900.0);
    assert_eq!(coarse.above_ellipsoid, 100.0);
}

#[test]
fn test_wide_root_tiling_with_deepest_tile() {
    let domain = SpatialReference::Geographic.domain();
    assert!(MapProfile::new(SpatialReference::Geographic, domain, 4, 2).is_err());

    let profile = Arc::new(MapProfile::new(SpatialReference::Geographic, domain, 2, 1).unwrap());
    let graph = Arc::new(TileGraph::new(Arc::clone(&profile)));
    let terrain = Terrain::new(Arc::clone(&profile), &graph);
    load_roots(&graph, 20.0);
    let (cols, _) = profile.tile_count(MAX_LOD);
    graph.insert(Tile::flat(TileKey::new(MAX_LOD, cols - 1, 0), 2, 2, 80.0).unwrap());

    let sample = terrain
        .get_height(SpatialReference::Geographic, 10.0, 10.0)
        .unwrap();
    assert_eq!(sample.above_ellipsoid, 20.0);
}

#[test]
fn test_out_of_range_tile_key_does_not_hide_terrain() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 10.0);
    graph.insert(Tile::flat(TileKey::new(MAX_LOD + 1, 0, 0), 2, 2, 99.0).unwrap());

    let sample = terrain
        .get_height(SpatialReference::Geographic, 10.0, 10.0)
        .unwrap();
    assert_eq!(sample.above_ellipsoid, 10.0);
    let patch = terrain.create_patch().unwrap();
    assert!(patch
        .get_height(SpatialReference::Geographic, 10.0, 10.0)
        .is_some());
}

#[test]
fn test_mercator_query_against_geodetic_profile() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 42.0);

    let (x, y) = lon_lat_to_mercator(10.0, 53.5).unwrap();
    let sample = terrain
        .get_height(SpatialReference::SphericalMercator, x, y)
        .unwrap();
    assert_eq!(sample.above_ellipsoid, 42.0);
}

#[test]
fn test_vertical_datum_separates_msl_and_ellipsoid() {
    let profile = Arc::new(
        MapProfile::global_geodetic().with_vertical_datum(VerticalDatum::GeoidOffset {
            name: "constant".to_string(),
            undulation_m: 40.0,
        }),
    );
    let graph = Arc::new(TileGraph::new(Arc::clone(&profile)));
    let terrain = Terrain::new(profile, &graph);
    load_roots(&graph, 140.0);

    let sample = terrain
        .get_height(SpatialReference::Geographic, 10.0, 10.0)
        .unwrap();
    assert_eq!(sample.above_ellipsoid, 140.0);
    assert!((sample.above_msl - 100.0).abs() < 1e-9);
}

// ============================================================================
// Patches
// ============================================================================

#[test]
fn test_patch_unaffected_by_later_graph_changes() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 10.0);
    let patch = terrain.create_patch().unwrap();

    graph.insert(Tile::flat(TileKey::new(1, 2, 0), 2, 2, 999.0).unwrap());
    graph.remove(&TileKey::new(0, 0, 0));

    let from_patch = terrain
        .get_height_in(&patch, SpatialReference::Geographic, 45.0, 45.0)
        .unwrap();
    assert_eq!(from_patch.above_ellipsoid, 10.0);
    assert!(terrain
        .get_height_in(&patch, SpatialReference::Geographic, -45.0, 45.0)
        .is_some());

    let live = terrain
        .get_height(SpatialReference::Geographic, 45.0, 45.0)
        .unwrap();
    assert_eq!(live.above_ellipsoid, 999.0);
    assert_eq!(
        terrain.get_height(SpatialReference::Geographic, -45.0, 45.0),
        None
    );
}

#[test]
fn test_patch_outlives_graph() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 10.0);
    let patch = terrain.create_patch().unwrap();
    drop(graph);

    assert!(patch
        .get_height(SpatialReference::Geographic, 10.0, 10.0)
        .is_some());
    assert_eq!(
        terrain.get_height(SpatialReference::Geographic, 10.0, 10.0),
        None
    );
}

/// A reader thread queries a patch while a loader keeps mutating the graph.
#[test]
fn test_patch_queries_concurrent_with_loader() {
    let (graph, terrain) = geodetic_fixture();
    load_roots(&graph, 10.0);
    let patch = terrain.create_patch().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let loader = {
        let graph = Arc::clone(&graph);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rng = rand::rng();
            while !done.load(Ordering::Relaxed) {
                let x = rng.random_range(0..4u32);
                let y = rng.random_range(0..2u32);
                let key = TileKey::new(1, x, y);
                if rng.random_bool(0.5) {
                    graph.insert(Tile::flat(key, 2, 2, 5000.0).unwrap());
                } else {
                    graph.remove(&key);
                }
            }
        })
    };

    let reader = {
        let patch = patch.clone();
        thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..2000 {
                let lon = rng.random_range(-179.0..179.0);
                let lat = rng.random_range(-89.0..89.0);
                let sample = patch
                    .get_height(SpatialReference::Geographic, lon, lat)
                    .unwrap();
                assert_eq!(sample.above_ellipsoid, 10.0);
            }
        })
    };

    reader.join().unwrap();
    done.store(true, Ordering::Relaxed);
    loader.join().unwrap();
}
