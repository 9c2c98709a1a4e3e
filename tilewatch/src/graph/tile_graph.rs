//! In-memory terrain graph keyed by tile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::tile::{Tile, TileHandle};
use super::TerrainGraph;
use crate::coord::{TileKey, MAX_LOD};
use crate::profile::MapProfile;

/// Concurrent live graph of heightfield tiles.
///
/// Loader threads insert and remove tiles while other threads sample it.
/// Sampling uses the finest loaded tile that contains the point.
pub struct TileGraph {
    profile: Arc<MapProfile>,
    tiles: DashMap<TileKey, TileHandle>,
    /// Deepest LOD ever inserted. Never decreases; only bounds the search.
    max_lod: AtomicU32,
}

impl TileGraph {
    /// Create an empty graph over `profile`.
    pub fn new(profile: Arc<MapProfile>) -> Self {
        Self {
            profile,
            tiles: DashMap::new(),
            max_lod: AtomicU32::new(0),
        }
    }

    pub fn profile(&self) -> &Arc<MapProfile> {
        &self.profile
    }

    /// Insert or replace a tile, returning the handle stored in the graph.
    pub fn insert(&self, tile: Tile) -> TileHandle {
        let handle = Arc::new(tile);
        let key = *handle.key();
        self.max_lod.fetch_max(key.lod, Ordering::Relaxed);
        self.tiles.insert(key, Arc::clone(&handle));
        handle
    }

    /// Remove a tile, returning its handle if it was loaded.
    pub fn remove(&self, key: &TileKey) -> Option<TileHandle> {
        self.tiles.remove(key).map(|(_, handle)| handle)
    }

    pub fn get(&self, key: &TileKey) -> Option<TileHandle> {
        self.tiles.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Keys of every loaded tile, in no particular order.
    pub fn keys(&self) -> Vec<TileKey> {
        self.tiles.iter().map(|entry| *entry.key()).collect()
    }

    /// Freeze the current contents into an immutable graph.
    ///
    /// Tiles are shared, not copied.
    pub fn snapshot(&self) -> TileGraphSnapshot {
        let tiles: HashMap<TileKey, TileHandle> = self
            .tiles
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        let max_lod = tiles.keys().map(|k| k.lod).max().unwrap_or(0);
        TileGraphSnapshot {
            profile: Arc::clone(&self.profile),
            tiles,
            max_lod,
        }
    }
}

impl std::fmt::Debug for TileGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileGraph")
            .field("tiles", &self.tiles.len())
            .field("max_lod", &self.max_lod.load(Ordering::Relaxed))
            .finish()
    }
}

impl TerrainGraph for TileGraph {
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64> {
        let max_lod = self.max_lod.load(Ordering::Relaxed);
        sample_finest(&self.profile, max_lod, x, y, |key| self.get(key))
    }

    fn detach(&self) -> Option<Arc<dyn TerrainGraph>> {
        Some(Arc::new(self.snapshot()))
    }
}

/// Immutable copy of a [`TileGraph`] taken at a point in time.
#[derive(Debug, Clone)]
pub struct TileGraphSnapshot {
    profile: Arc<MapProfile>,
    tiles: HashMap<TileKey, TileHandle>,
    max_lod: u32,
}

impl TileGraphSnapshot {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }
}

impl TerrainGraph for TileGraphSnapshot {
    fn sample_elevation(&self, x: f64, y: f64) -> Option<f64> {
        sample_finest(&self.profile, self.max_lod, x, y, |key| {
            self.tiles.get(key).cloned()
        })
    }

    fn detach(&self) -> Option<Arc<dyn TerrainGraph>> {
        Some(Arc::new(self.clone()))
    }
}

/// Sample the deepest tile containing the point, walking up from `max_lod`.
///
/// Tiles keyed beyond [`MAX_LOD`] can be stored but are never sampled.
fn sample_finest<F>(profile: &MapProfile, max_lod: u32, x: f64, y: f64, lookup: F) -> Option<f64>
where
    F: Fn(&TileKey) -> Option<TileHandle>,
{
    for lod in (0..=max_lod.min(MAX_LOD)).rev() {
        let key = profile.tile_key_at(x, y, lod)?;
        if let Some(tile) = lookup(&key) {
            let extent = profile.tile_extent(&key);
            if let Some(height) = tile.sample(&extent, x, y) {
                return Some(height);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> TileGraph {
        TileGraph::new(Arc::new(MapProfile::global_geodetic()))
    }

    #[test]
    fn test_empty_graph_has_no_elevation() {
        assert_eq!(graph().sample_elevation(10.0, 50.0), None);
    }

    #[test]
    fn test_insert_and_sample() {
        let graph = graph();
        graph.insert(Tile::flat(TileKey::new(0, 1, 0), 2, 2, 250.0).unwrap());

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.sample_elevation(10.0, 50.0), Some(250.0));
        // Western hemisphere is tile (0, 0, 0), not loaded.
        assert_eq!(graph.sample_elevation(-10.0, 50.0), None);
    }

    #[test]
    fn test_finest_tile_wins() {
        let graph = graph();
        graph.insert(Tile::flat(TileKey::new(0, 1, 0), 2, 2, 100.0).unwrap());
        let fine = graph.profile().tile_key_at(10.0, 50.0, 4).unwrap();
        graph.insert(Tile::flat(fine, 2, 2, 300.0).unwrap());

        assert_eq!(graph.sample_elevation(10.0, 50.0), Some(300.0));
        // Outside the fine tile the coarse one still answers.
        assert_eq!(graph.sample_elevation(170.0, -50.0), Some(100.0));
    }

    #[test]
    fn test_tile_beyond_max_lod_does_not_hide_coarser_tiles() {
        let graph = graph();
        graph.insert(Tile::flat(TileKey::new(0, 1, 0), 2, 2, 10.0).unwrap());
        graph.insert(Tile::flat(TileKey::new(MAX_LOD + 1, 0, 0), 2, 2, 99.0).unwrap());

        assert_eq!(graph.sample_elevation(10.0, 10.0), Some(10.0));
        assert_eq!(graph.snapshot().sample_elevation(10.0, 10.0), Some(10.0));
    }

    #[test]
    fn test_deepest_lod_tile_is_sampled() {
        let graph = graph();
        graph.insert(Tile::flat(TileKey::new(0, 1, 0), 2, 2, 10.0).unwrap());
        // Origin lands exactly on tile corners at every LOD.
        let deep = graph.profile().tile_key_at(0.0, 0.0, MAX_LOD).unwrap();
        graph.insert(Tile::flat(deep, 2, 2, 70.0).unwrap());

        assert_eq!(graph.sample_elevation(0.0, 0.0), Some(70.0));
        assert_eq!(graph.sample_elevation(-10.0, 10.0), None);
    }

    #[test]
    fn test_remove() {
        let graph = graph();
        let key = TileKey::new(0, 1, 0);
        graph.insert(Tile::flat(key, 2, 2, 100.0).unwrap());

        assert!(graph.remove(&key).is_some());
        assert!(graph.remove(&key).is_none());
        assert_eq!(graph.sample_elevation(10.0, 50.0), None);
    }

    #[test]
    fn test_snapshot_isolated_from_later_changes() {
        let graph = graph();
        let key = TileKey::new(0, 1, 0);
        graph.insert(Tile::flat(key, 2, 2, 100.0).unwrap());

        let snapshot = graph.snapshot();
        graph.remove(&key);
        graph.insert(Tile::flat(TileKey::new(0, 0, 0), 2, 2, 5.0).unwrap());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.sample_elevation(10.0, 50.0), Some(100.0));
        assert_eq!(snapshot.sample_elevation(-10.0, 50.0), None);
    }

    #[test]
    fn test_detach_returns_frozen_graph() {
        let graph = graph();
        graph.insert(Tile::flat(TileKey::new(0, 1, 0), 2, 2, 42.0).unwrap());
        let detached = graph.detach().unwrap();
        graph.remove(&TileKey::new(0, 1, 0));
        assert_eq!(detached.sample_elevation(10.0, 50.0), Some(42.0));
    }
}
