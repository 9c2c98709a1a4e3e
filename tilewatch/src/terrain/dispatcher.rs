//! Deferred tile notifications.
//!
//! Loader threads report graph changes with `notify_*`, which only enqueues.
//! The dispatch thread (normally the update loop, once per frame) drains the
//! queue and invokes listeners.
//!
//! # State Machine
//!
//! ```text
//! Idle --[notify_*]--> Queued --[fire_*]--> Dispatching --[queue empty]--> Idle
//!                                               |
//!                                               +--[events left]--> Queued
//! ```
//!
//! # Delivery Rules
//!
//! - Events are delivered in the order they were queued.
//! - Each event gets its own registry snapshot; listeners run in
//!   registration order over that snapshot.
//! - A pass only delivers the events queued when it started. Anything
//!   queued during the pass (including by listeners) waits for the next one.
//! - A panicking listener is logged and skipped; the rest of the pass runs.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use super::callback::{SharedTerrainCallback, TerrainCallbackContext};
use super::registry::{same_listener, CallbackRegistry};
use super::Terrain;
use crate::coord::TileKey;
use crate::graph::TileHandle;
use crate::metrics::DispatchMetrics;

// =============================================================================
// Events and Configuration
// =============================================================================

/// A change to the live graph awaiting delivery.
#[derive(Debug, Clone)]
pub enum TileEvent {
    /// One tile became part of the graph.
    Added { key: TileKey, tile: TileHandle },
    /// A batch of tiles left the graph.
    Removed { keys: Vec<TileKey> },
}

impl TileEvent {
    fn kind(&self) -> &'static str {
        match self {
            TileEvent::Added { .. } => "added",
            TileEvent::Removed { .. } => "removed",
        }
    }
}

/// Observable dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Nothing queued, no pass running.
    Idle,
    /// Events are waiting for the next pass.
    Queued,
    /// A pass is running.
    Dispatching,
}

/// Tuning for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Merge consecutive removal batches into one notification.
    pub coalesce_removals: bool,
    /// Maximum events delivered per pass (0 = unlimited).
    pub max_events_per_pass: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            coalesce_removals: true,
            max_events_per_pass: 0,
        }
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events taken off the queue (after coalescing).
    pub events: usize,
    /// Listener invocations made.
    pub invocations: usize,
    /// Listeners unregistered at their own request.
    pub removed: usize,
    /// Weak listeners unregistered because their target was gone.
    pub stale: usize,
    /// Listener invocations that panicked.
    pub faults: usize,
    /// The call found a pass already running and only enqueued.
    pub deferred: bool,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Queue of tile events plus the listeners they are delivered to.
pub struct NotificationDispatcher {
    registry: CallbackRegistry,
    queue: Mutex<VecDeque<TileEvent>>,
    dispatching: AtomicBool,
    config: DispatcherConfig,
    metrics: Arc<DispatchMetrics>,
}

impl NotificationDispatcher {
    pub fn new(registry: CallbackRegistry, config: DispatcherConfig) -> Self {
        Self {
            registry,
            queue: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
            config,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Events waiting for the next pass.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn state(&self) -> DispatchState {
        if self.dispatching.load(Ordering::Acquire) {
            DispatchState::Dispatching
        } else if self.queue.lock().is_empty() {
            DispatchState::Idle
        } else {
            DispatchState::Queued
        }
    }

    /// Queue a tile-added event. Callable from any thread.
    pub fn notify_tile_added(&self, key: TileKey, tile: TileHandle) {
        self.enqueue(TileEvent::Added { key, tile });
    }

    /// Queue a tile-removed batch. Callable from any thread.
    pub fn notify_tiles_removed(&self, keys: Vec<TileKey>) {
        if keys.is_empty() {
            return;
        }
        self.enqueue(TileEvent::Removed { keys });
    }

    /// Queue a tile-added event behind any pending ones and drain the queue.
    pub fn fire_tile_added(
        &self,
        terrain: &Terrain,
        key: TileKey,
        tile: TileHandle,
    ) -> DispatchReport {
        self.notify_tile_added(key, tile);
        self.fire_pending(terrain)
    }

    /// Queue a removal batch behind any pending events and drain the queue.
    pub fn fire_tiles_removed(&self, terrain: &Terrain, keys: Vec<TileKey>) -> DispatchReport {
        self.notify_tiles_removed(keys);
        self.fire_pending(terrain)
    }

    /// Deliver the events queued so far.
    ///
    /// A call made while a pass is running (for instance from inside a
    /// listener) returns immediately with `deferred` set.
    pub fn fire_pending(&self, terrain: &Terrain) -> DispatchReport {
        if self
            .dispatching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Dispatch already in progress; events stay queued");
            return DispatchReport {
                deferred: true,
                ..Default::default()
            };
        }
        let _pass = PassGuard(&self.dispatching);

        let batch = self.take_batch();
        let mut report = DispatchReport {
            events: batch.len(),
            ..Default::default()
        };
        for event in &batch {
            self.deliver(terrain, event, &mut report);
            self.metrics.event_delivered();
        }

        if report.events > 0 {
            self.metrics.pass_completed();
            trace!(
                events = report.events,
                invocations = report.invocations,
                faults = report.faults,
                "Dispatch pass complete"
            );
        }
        report
    }

    /// Discard queued events without delivering them.
    pub fn clear_pending(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    fn enqueue(&self, event: TileEvent) {
        if self.registry.is_empty() {
            self.metrics.event_dropped();
            trace!(kind = event.kind(), "No terrain callbacks; event dropped");
            return;
        }
        self.queue.lock().push_back(event);
        self.metrics.event_queued();
    }

    /// Take this pass's events off the queue, merging adjacent removals.
    fn take_batch(&self) -> Vec<TileEvent> {
        let mut queue = self.queue.lock();
        let count = match self.config.max_events_per_pass {
            0 => queue.len(),
            max => max.min(queue.len()),
        };
        let drained = queue.drain(..count);
        if !self.config.coalesce_removals {
            return drained.collect();
        }

        let mut batch: Vec<TileEvent> = Vec::with_capacity(count);
        for event in drained {
            if let (Some(TileEvent::Removed { keys }), TileEvent::Removed { keys: more }) =
                (batch.last_mut(), &event)
            {
                keys.extend_from_slice(more);
                // Merged events still count as delivered once each.
                self.metrics.event_delivered();
                continue;
            }
            batch.push(event);
        }
        batch
    }

    fn deliver(&self, terrain: &Terrain, event: &TileEvent, report: &mut DispatchReport) {
        let listeners = self.registry.snapshot();
        let mut unregistered: Vec<SharedTerrainCallback> = Vec::new();

        for listener in &listeners {
            // A listener that removed itself earlier in this event may still
            // appear again in the snapshot when duplicates are allowed.
            if unregistered.iter().any(|r| same_listener(r, listener)) {
                continue;
            }

            if !listener.is_alive() {
                self.registry.remove(listener);
                unregistered.push(Arc::clone(listener));
                report.stale += 1;
                self.metrics.stale_removed();
                debug!(
                    listener = listener.name(),
                    "Terrain callback target dropped; unregistered"
                );
                continue;
            }

            let mut context = TerrainCallbackContext::new(terrain);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
                TileEvent::Added { key, tile } => listener.on_tile_added(key, tile, &mut context),
                TileEvent::Removed { keys } => listener.on_tiles_removed(keys, &mut context),
            }));
            report.invocations += 1;
            self.metrics.invocation();

            if let Err(payload) = outcome {
                report.faults += 1;
                self.metrics.fault();
                error!(
                    listener = listener.name(),
                    kind = event.kind(),
                    panic = %panic_message(payload.as_ref()),
                    "Terrain callback panicked; continuing dispatch"
                );
            }

            if context.marked_for_removal() {
                self.registry.remove(listener);
                unregistered.push(Arc::clone(listener));
                report.removed += 1;
                self.metrics.removal();
            }
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("registry", &self.registry)
            .field("pending", &self.pending())
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Clears the dispatching flag even if a pass unwinds.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
