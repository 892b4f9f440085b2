//! Multicast dispatch that does not keep subscribers alive.
//!
//! A long-lived publisher holding strong references to its subscribers is a
//! classic leak. [`WeakObserverRegistry`] holds instance subscribers through
//! [`Weak`](std::sync::Weak) handles and prunes them once their owner is gone;
//! static subscribers own nothing and are always eligible.
//!
//! The entry list is copy-on-write: `invoke` walks an immutable snapshot, so a
//! concurrent `add`/`remove`/`clear` never disturbs a dispatch in flight.

mod handler;

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_utils::Backoff;
use tracing::trace;

use handler::{Dispatch, ObserverEntry};
pub use handler::{Handler, HandlerIdentity, StaticMethod};

type Snapshot<A> = Vec<Arc<ObserverEntry<A>>>;

/// A thread-safe list of weakly held event handlers.
pub struct WeakObserverRegistry<A> {
    entries: ArcSwap<Snapshot<A>>,
}

impl<A: 'static> WeakObserverRegistry<A> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Registers `handler`.
    ///
    /// Returns `false` without effect for `None`, or when a handler with the
    /// same (owner, method) identity is already registered.
    pub fn add(&self, handler: impl Into<Option<Handler<A>>>) -> bool {
        let Some(handler) = handler.into() else {
            return false;
        };
        let identity = handler.identity();
        let entry = Arc::new(handler.entry);

        self.update(|current| {
            if current.iter().any(|e| e.identity() == identity) {
                return None;
            }
            let mut next = current.clone();
            next.push(Arc::clone(&entry));
            Some(next)
        })
    }

    /// Removes the handler with the same identity as `handler`.
    ///
    /// Returns `false` for `None` or when no such handler is registered.
    /// Across crates prefer [`remove_identity`](Self::remove_identity); see
    /// [`HandlerIdentity`].
    pub fn remove(&self, handler: impl Into<Option<Handler<A>>>) -> bool {
        match handler.into() {
            Some(handler) => self.remove_identity(handler.identity()),
            None => false,
        }
    }

    /// Removes the handler registered under `identity`.
    pub fn remove_identity(&self, identity: HandlerIdentity) -> bool {
        self.update(|current| {
            let position = current.iter().position(|e| e.identity() == identity)?;
            let mut next = current.clone();
            next.remove(position);
            Some(next)
        })
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.entries.store(Arc::new(Vec::new()));
    }

    /// Calls every live handler once with `sender` and `args`.
    ///
    /// Handlers whose owner has been dropped are skipped and pruned. Order is
    /// unspecified. Handlers may re-enter the registry.
    pub fn invoke(&self, sender: &dyn Any, args: &A) {
        let snapshot = self.entries.load_full();
        let mut dead = Vec::new();

        for entry in snapshot.iter() {
            if let Dispatch::Dead = entry.dispatch(sender, args) {
                dead.push(entry.identity());
            }
        }

        if !dead.is_empty() {
            self.prune(&dead);
        }
    }

    /// Number of registered entries, dead ones not yet pruned included.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Number of entries whose owner is still alive.
    pub fn live_count(&self) -> usize {
        self.entries.load().iter().filter(|e| e.is_alive()).count()
    }

    fn prune(&self, dead: &[HandlerIdentity]) {
        let pruned = self.update(|current| {
            let next: Snapshot<A> = current
                .iter()
                .filter(|e| e.is_alive() || !dead.contains(&e.identity()))
                .cloned()
                .collect();
            (next.len() != current.len()).then_some(next)
        });
        if pruned {
            trace!(count = dead.len(), "pruned dead observers");
        }
    }

    /// Applies `edit` with compare-and-swap retry. `edit` returns `None` to
    /// leave the list untouched.
    fn update(&self, mut edit: impl FnMut(&Snapshot<A>) -> Option<Snapshot<A>>) -> bool {
        let backoff = Backoff::new();
        loop {
            let current = self.entries.load_full();
            let Some(next) = edit(&current) else {
                return false;
            };
            let previous = self.entries.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&previous, &current) {
                return true;
            }
            backoff.spin();
        }
    }
}

impl<A: 'static> Default for WeakObserverRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for WeakObserverRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObserverRegistry")
            .field("entries", &self.entries.load().len())
            .finish()
    }
}
