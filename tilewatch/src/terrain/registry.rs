//! Thread-safe ordered set of terrain callbacks.
//!
//! Writers (add/remove) take the write lock; dispatch takes a read lock just
//! long enough to copy the handles out, then invokes them with no lock held.
//! A listener that adds or removes callbacks from inside its own invocation
//! therefore never deadlocks.
//!
//! The `len` counter lives outside the lock so producers can cheaply skip
//! queueing events nobody will hear.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::callback::SharedTerrainCallback;

/// What [`CallbackRegistry::add`] does with a listener that is already
/// registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Ignore the second registration (idempotent add).
    #[default]
    Reject,
    /// Register again; the listener is invoked once per registration.
    Allow,
}

impl DuplicatePolicy {
    /// Parse a config value (`reject` or `allow`).
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Some(DuplicatePolicy::Reject),
            "allow" => Some(DuplicatePolicy::Allow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Reject => "reject",
            DuplicatePolicy::Allow => "allow",
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered collection of listeners, safe to mutate during dispatch.
pub struct CallbackRegistry {
    entries: RwLock<Vec<SharedTerrainCallback>>,
    len: AtomicUsize,
    policy: DuplicatePolicy,
}

impl CallbackRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            len: AtomicUsize::new(0),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Append a listener.
    ///
    /// Returns `false` if the listener was already registered and the policy
    /// is [`DuplicatePolicy::Reject`].
    pub fn add(&self, listener: SharedTerrainCallback) -> bool {
        let mut entries = self.entries.write();
        if self.policy == DuplicatePolicy::Reject
            && entries.iter().any(|e| same_listener(e, &listener))
        {
            debug!(listener = listener.name(), "Terrain callback already registered");
            return false;
        }
        debug!(listener = listener.name(), "Terrain callback registered");
        entries.push(listener);
        self.len.store(entries.len(), Ordering::Release);
        true
    }

    /// Remove every registration of `listener`.
    ///
    /// Returns how many entries were removed; removing an unknown listener is
    /// a no-op.
    pub fn remove(&self, listener: &SharedTerrainCallback) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !same_listener(e, listener));
        let removed = before - entries.len();
        self.len.store(entries.len(), Ordering::Release);
        if removed > 0 {
            debug!(listener = listener.name(), removed, "Terrain callback unregistered");
        }
        removed
    }

    /// Whether `listener` is currently registered.
    pub fn contains(&self, listener: &SharedTerrainCallback) -> bool {
        self.entries.read().iter().any(|e| same_listener(e, listener))
    }

    /// Point-in-time copy of the listeners, in registration order.
    pub fn snapshot(&self) -> Vec<SharedTerrainCallback> {
        self.entries.read().clone()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.len.store(0, Ordering::Release);
    }

    /// Number of registrations, without taking the lock.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Listener identity is the address of the shared object.
pub(crate) fn same_listener(a: &SharedTerrainCallback, b: &SharedTerrainCallback) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileKey;
    use crate::graph::TileHandle;
    use crate::terrain::{callback_fn, TerrainCallback, TerrainCallbackContext};

    fn listener() -> SharedTerrainCallback {
        callback_fn("test", |_, _, _| {})
    }

    #[test]
    fn test_add_preserves_order() {
        let registry = CallbackRegistry::default();
        let a = listener();
        let b = listener();
        registry.add(Arc::clone(&a));
        registry.add(Arc::clone(&b));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(same_listener(&snapshot[0], &a));
        assert!(same_listener(&snapshot[1], &b));
    }

    #[test]
    fn test_duplicate_rejected_by_default() {
        let registry = CallbackRegistry::default();
        let a = listener();
        assert!(registry.add(Arc::clone(&a)));
        assert!(!registry.add(Arc::clone(&a)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_allowed_when_configured() {
        let registry = CallbackRegistry::new(DuplicatePolicy::Allow);
        let a = listener();
        assert!(registry.add(Arc::clone(&a)));
        assert!(registry.add(Arc::clone(&a)));
        assert_eq!(registry.len(), 2);

        // Remove takes out every entry for the listener.
        assert_eq!(registry.remove(&a), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = CallbackRegistry::default();
        registry.add(listener());
        assert_eq!(registry.remove(&listener()), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_changes() {
        let registry = CallbackRegistry::default();
        let a = listener();
        registry.add(Arc::clone(&a));

        let snapshot = registry.snapshot();
        registry.remove(&a);
        registry.add(listener());

        assert_eq!(snapshot.len(), 1);
        assert!(same_listener(&snapshot[0], &a));
    }

    #[test]
    fn test_clear() {
        let registry = CallbackRegistry::default();
        registry.add(listener());
        registry.add(listener());
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_identity_is_per_allocation() {
        struct Unit;
        impl TerrainCallback for Unit {
            fn on_tile_added(
                &self,
                _: &TileKey,
                _: &TileHandle,
                _: &mut TerrainCallbackContext<'_>,
            ) {
            }
        }

        let registry = CallbackRegistry::default();
        let a: SharedTerrainCallback = Arc::new(Unit);
        let b: SharedTerrainCallback = Arc::new(Unit);
        assert!(registry.add(Arc::clone(&a)));
        assert!(registry.add(Arc::clone(&b)));
        assert!(registry.contains(&a));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_policy_from_config_str() {
        assert_eq!(
            DuplicatePolicy::from_config_str(" Allow "),
            Some(DuplicatePolicy::Allow)
        );
        assert_eq!(
            DuplicatePolicy::from_config_str("reject"),
            Some(DuplicatePolicy::Reject)
        );
        assert_eq!(DuplicatePolicy::from_config_str("maybe"), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(usize),
            Remove(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(0usize..6).prop_map(Op::Add), (0usize..6).prop_map(Op::Remove)]
        }

        proptest! {
            #[test]
            fn test_registry_matches_model(
                ops in proptest::collection::vec(op(), 0..60),
                allow in any::<bool>(),
            ) {
                let policy = if allow { DuplicatePolicy::Allow } else { DuplicatePolicy::Reject };
                let registry = CallbackRegistry::new(policy);
                let pool: Vec<SharedTerrainCallback> = (0..6).map(|_| listener()).collect();
                let mut model: Vec<usize> = Vec::new();

                for op in ops {
                    match op {
                        Op::Add(i) => {
                            let added = registry.add(Arc::clone(&pool[i]));
                            let expect = allow || !model.contains(&i);
                            prop_assert_eq!(added, expect);
                            if expect {
                                model.push(i);
                            }
                        }
                        Op::Remove(i) => {
                            let removed = registry.remove(&pool[i]);
                            let before = model.len();
                            model.retain(|m| *m != i);
                            prop_assert_eq!(removed, before - model.len());
                        }
                    }
                }

                let snapshot = registry.snapshot();
                prop_assert_eq!(registry.len(), model.len());
                prop_assert_eq!(snapshot.len(), model.len());
                for (entry, idx) in snapshot.iter().zip(model.iter()) {
                    prop_assert!(same_listener(entry, &pool[*idx]));
                }
            }
        }
    }
}
