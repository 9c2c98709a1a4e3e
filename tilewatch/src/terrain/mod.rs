//! Live terrain handle, tile notifications and height queries.
//!
//! A [`Terrain`] binds together:
//!
//! - an immutable [`MapProfile`] fixed at construction,
//! - a non-owning reference to the engine's live [`TerrainGraph`],
//! - a [`CallbackRegistry`] of listeners and the [`NotificationDispatcher`]
//!   that delivers tile events to them.
//!
//! # Threading
//!
//! ```text
//! loader threads ──notify_tile_added──►┐
//!                ──notify_tiles_removed►│ queue
//!                                       ▼
//! update thread  ──fire_pending──────► listeners (registration order)
//! ```
//!
//! `notify_*` never blocks on listeners. `fire_*` runs listeners
//! synchronously on the calling thread.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilewatch::graph::TileGraph;
//! use tilewatch::profile::{MapProfile, SpatialReference};
//! use tilewatch::terrain::{callback_fn, Terrain, TerrainResolver};
//!
//! let profile = Arc::new(MapProfile::global_geodetic());
//! let graph = Arc::new(TileGraph::new(Arc::clone(&profile)));
//! let terrain = Terrain::new(profile, &graph);
//!
//! terrain.add_terrain_callback(callback_fn("log", |key, _tile, _ctx| {
//!     tracing::info!(%key, "tile added");
//! }));
//!
//! // loader thread
//! terrain.notify_tile_added(key, handle);
//!
//! // update thread, once per frame
//! terrain.fire_pending();
//!
//! let height = terrain.get_height(SpatialReference::Geographic, 10.0, 53.5);
//! ```

mod callback;
mod dispatcher;
mod registry;
mod resolver;

use std::sync::{Arc, Weak};

use tracing::debug;

pub use callback::{
    callback_fn, FnTerrainCallback, SharedTerrainCallback, TerrainCallback,
    TerrainCallbackContext, WeakTerrainCallback,
};
pub use dispatcher::{
    DispatchReport, DispatchState, DispatcherConfig, NotificationDispatcher, TileEvent,
};
pub use registry::{CallbackRegistry, DuplicatePolicy};
pub use resolver::{HeightSample, TerrainPatch, TerrainResolver};

use crate::coord::TileKey;
use crate::graph::{SharedTerrainGraph, TerrainGraph, TileHandle};
use crate::metrics::MetricsSnapshot;
use crate::profile::{MapProfile, SpatialReference};

/// Construction options for a [`Terrain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerrainOptions {
    /// How repeated registrations of the same listener are handled.
    pub duplicate_policy: DuplicatePolicy,
    /// Dispatcher tuning.
    pub dispatcher: DispatcherConfig,
}

/// Handle to a live terrain graph.
pub struct Terrain {
    profile: Arc<MapProfile>,
    graph: Weak<dyn TerrainGraph>,
    dispatcher: NotificationDispatcher,
}

impl Terrain {
    /// Create a terrain over `graph` with default options.
    ///
    /// Only a weak reference to `graph` is kept; the engine stays in charge
    /// of its lifetime.
    pub fn new<G>(profile: Arc<MapProfile>, graph: &Arc<G>) -> Self
    where
        G: TerrainGraph + 'static,
    {
        Self::with_options(profile, graph, TerrainOptions::default())
    }

    /// Create a terrain with explicit options.
    pub fn with_options<G>(
        profile: Arc<MapProfile>,
        graph: &Arc<G>,
        options: TerrainOptions,
    ) -> Self
    where
        G: TerrainGraph + 'static,
    {
        let weak: Weak<G> = Arc::downgrade(graph);
        Self::from_weak(profile, weak, options)
    }

    /// Create a terrain from an already-weak graph reference.
    pub fn from_weak(
        profile: Arc<MapProfile>,
        graph: Weak<dyn TerrainGraph>,
        options: TerrainOptions,
    ) -> Self {
        let registry = CallbackRegistry::new(options.duplicate_policy);
        Self {
            profile,
            graph,
            dispatcher: NotificationDispatcher::new(registry, options.dispatcher),
        }
    }

    pub fn profile(&self) -> &Arc<MapProfile> {
        &self.profile
    }

    /// The live graph, if the engine still holds it.
    pub fn graph(&self) -> Option<SharedTerrainGraph> {
        self.graph.upgrade()
    }

    pub fn is_graph_alive(&self) -> bool {
        self.graph.strong_count() > 0
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    // -------------------------------------------------------------------------
    // Listener registration
    // -------------------------------------------------------------------------

    /// Register a listener. Returns `false` if rejected as a duplicate.
    pub fn add_terrain_callback(&self, callback: SharedTerrainCallback) -> bool {
        self.dispatcher.registry().add(callback)
    }

    /// Unregister a listener. Unknown listeners are ignored.
    pub fn remove_terrain_callback(&self, callback: &SharedTerrainCallback) -> usize {
        self.dispatcher.registry().remove(callback)
    }

    pub fn callback_count(&self) -> usize {
        self.dispatcher.registry().len()
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Queue a tile-added event. Callable from any thread.
    pub fn notify_tile_added(&self, key: TileKey, tile: TileHandle) {
        self.dispatcher.notify_tile_added(key, tile);
    }

    /// Queue a removal batch. Callable from any thread.
    pub fn notify_tiles_removed(&self, keys: Vec<TileKey>) {
        self.dispatcher.notify_tiles_removed(keys);
    }

    /// Deliver a tile-added event now, after everything already queued.
    pub fn fire_tile_added(&self, key: TileKey, tile: TileHandle) -> DispatchReport {
        self.dispatcher.fire_tile_added(self, key, tile)
    }

    /// Deliver a removal batch now, after everything already queued.
    pub fn fire_tiles_removed(&self, keys: Vec<TileKey>) -> DispatchReport {
        self.dispatcher.fire_tiles_removed(self, keys)
    }

    /// Deliver everything queued. Call once per update cycle.
    pub fn fire_pending(&self) -> DispatchReport {
        self.dispatcher.fire_pending(self)
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.dispatcher.metrics().snapshot()
    }

    // -------------------------------------------------------------------------
    // Patches
    // -------------------------------------------------------------------------

    /// Capture the live graph into a patch, if the engine supports detaching.
    pub fn create_patch(&self) -> Option<TerrainPatch> {
        let graph = self.graph()?;
        let detached = graph.detach()?;
        Some(TerrainPatch::new(Arc::clone(&self.profile), detached))
    }
}

impl TerrainResolver for Terrain {
    fn get_height(&self, srs: SpatialReference, x: f64, y: f64) -> Option<HeightSample> {
        let Some(graph) = self.graph() else {
            debug!("Height query on a terrain whose graph was released");
            return None;
        };
        resolver::resolve_height(&self.profile, graph.as_ref(), srs, x, y)
    }
}

impl std::fmt::Debug for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terrain")
            .field("profile", &self.profile)
            .field("graph_alive", &self.is_graph_alive())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
