//! Listener capability and per-invocation context.

use std::sync::{Arc, Weak};

use super::Terrain;
use crate::coord::TileKey;
use crate::graph::TileHandle;

/// Observer of tile activity in a live terrain graph.
///
/// Callbacks run on the dispatch thread, one event at a time, in registration
/// order. A callback may add or remove other callbacks on the terrain while it
/// runs; those changes apply from the next event onward.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: they are registered from any thread
/// and invoked from the dispatch thread. Use interior mutability for state.
pub trait TerrainCallback: Send + Sync {
    /// A tile was added to the live graph.
    fn on_tile_added(
        &self,
        key: &TileKey,
        tile: &TileHandle,
        context: &mut TerrainCallbackContext<'_>,
    );

    /// A batch of tiles was removed from the live graph.
    fn on_tiles_removed(&self, _keys: &[TileKey], _context: &mut TerrainCallbackContext<'_>) {}

    /// Whether the object behind this callback still exists.
    ///
    /// Dispatch unregisters callbacks that report `false` without invoking
    /// them.
    fn is_alive(&self) -> bool {
        true
    }

    /// Name used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared listener handle as stored in the registry.
pub type SharedTerrainCallback = Arc<dyn TerrainCallback>;

/// Mutable record handed to a callback for one invocation.
pub struct TerrainCallbackContext<'a> {
    terrain: &'a Terrain,
    remove: bool,
}

impl<'a> TerrainCallbackContext<'a> {
    pub(crate) fn new(terrain: &'a Terrain) -> Self {
        Self {
            terrain,
            remove: false,
        }
    }

    /// The terrain that fired this notification.
    pub fn terrain(&self) -> &'a Terrain {
        self.terrain
    }

    /// Unregister this callback once the current notification completes.
    pub fn remove(&mut self) {
        self.remove = true;
    }

    /// Whether [`remove`](Self::remove) was called.
    pub fn marked_for_removal(&self) -> bool {
        self.remove
    }
}

/// Adapter that observes on behalf of an object without keeping it alive.
///
/// Once the target is dropped the adapter reports itself stale and dispatch
/// unregisters it.
pub struct WeakTerrainCallback<T: TerrainCallback> {
    target: Weak<T>,
}

impl<T: TerrainCallback + 'static> WeakTerrainCallback<T> {
    /// Wrap `target` and return a handle ready for registration.
    pub fn wrap(target: &Arc<T>) -> SharedTerrainCallback {
        Arc::new(Self {
            target: Arc::downgrade(target),
        })
    }
}

impl<T: TerrainCallback> TerrainCallback for WeakTerrainCallback<T> {
    fn on_tile_added(
        &self,
        key: &TileKey,
        tile: &TileHandle,
        context: &mut TerrainCallbackContext<'_>,
    ) {
        if let Some(target) = self.target.upgrade() {
            target.on_tile_added(key, tile, context);
        }
    }

    fn on_tiles_removed(&self, keys: &[TileKey], context: &mut TerrainCallbackContext<'_>) {
        if let Some(target) = self.target.upgrade() {
            target.on_tiles_removed(keys, context);
        }
    }

    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn name(&self) -> &str {
        "weak-terrain-callback"
    }
}

/// Callback backed by a closure, for listeners that only care about
/// additions.
pub struct FnTerrainCallback<F> {
    name: String,
    on_added: F,
}

impl<F> TerrainCallback for FnTerrainCallback<F>
where
    F: Fn(&TileKey, &TileHandle, &mut TerrainCallbackContext<'_>) + Send + Sync,
{
    fn on_tile_added(
        &self,
        key: &TileKey,
        tile: &TileHandle,
        context: &mut TerrainCallbackContext<'_>,
    ) {
        (self.on_added)(key, tile, context)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a registrable callback from a closure.
///
/// # Example
///
/// ```ignore
/// terrain.add_terrain_callback(callback_fn("logger", |key, _tile, _ctx| {
///     tracing::info!(%key, "tile added");
/// }));
/// ```
pub fn callback_fn<F>(name: impl Into<String>, on_added: F) -> SharedTerrainCallback
where
    F: Fn(&TileKey, &TileHandle, &mut TerrainCallbackContext<'_>) + Send + Sync + 'static,
{
    Arc::new(FnTerrainCallback {
        name: name.into(),
        on_added,
    })
}
