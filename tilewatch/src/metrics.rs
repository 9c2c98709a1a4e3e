//! Dispatcher telemetry.
//!
//! Lock-free counters updated on the notification path, with a point-in-time
//! [`MetricsSnapshot`] for display.
//!
//! ```text
//! notify_* / fire_* ─────► DispatchMetrics ─────► MetricsSnapshot ─────► CLI, logs
//!                          (atomic counters)      (plain copy)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing notification traffic for one terrain.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    events_queued: AtomicU64,
    events_dropped: AtomicU64,
    events_delivered: AtomicU64,
    invocations: AtomicU64,
    removals: AtomicU64,
    stale_removed: AtomicU64,
    faults: AtomicU64,
    passes: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event entered the queue.
    pub fn event_queued(&self) {
        self.events_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// An event was discarded because nobody was listening.
    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// A listener asked to be removed from inside its callback.
    pub fn removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// A weak listener whose target was gone was unregistered.
    pub fn stale_removed(&self) {
        self.stale_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// A listener panicked.
    pub fn fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_completed(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_queued: self.events_queued.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            stale_removed: self.stale_removed.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_queued: u64,
    pub events_dropped: u64,
    pub events_delivered: u64,
    pub invocations: u64,
    pub removals: u64,
    pub stale_removed: u64,
    pub faults: u64,
    pub passes: u64,
}

impl MetricsSnapshot {
    /// Events queued but not yet delivered.
    pub fn backlog(&self) -> u64 {
        self.events_queued.saturating_sub(self.events_delivered)
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queued={} dropped={} delivered={} invocations={} removals={} stale={} faults={} passes={}",
            self.events_queued,
            self.events_dropped,
            self.events_delivered,
            self.invocations,
            self.removals,
            self.stale_removed,
            self.faults,
            self.passes
        )
    }
}
