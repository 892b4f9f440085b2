//! Exactly-once release of objects and of the resources they own.
//!
//! [`Release`] is the capability; [`Lifecycle`] is the reusable
//! `released`/`releasing` flag pair that gates it. [`Cascade`] wraps a state
//! struct annotated with `#[derive(OwnedState)]` and, on release, walks its
//! fields and releases the ones it owns:
//!
//! ```rust
//! use std::sync::Arc;
//! use warden::lifecycle::{Cascade, Owned, QueryRelease, Release};
//! use warden::{OwnedState, ReleaseError};
//!
//! #[derive(Default)]
//! struct Socket(warden::AtomicCell<bool>);
//!
//! impl Release for Socket {
//!     fn release(&self) -> Result<(), ReleaseError> {
//!         self.0.write(true);
//!         Ok(())
//!     }
//! }
//!
//! #[derive(OwnedState)]
//! struct Session {
//!     socket: Arc<Socket>,
//!     spare: Owned<Arc<Socket>>,
//!     #[release(not_owned)]
//!     shared: Arc<Socket>,
//! }
//!
//! let shared = Arc::new(Socket::default());
//! let session = Cascade::new(Session {
//!     socket: Arc::new(Socket::default()),
//!     spare: Owned::new(Arc::new(Socket::default())),
//!     shared: Arc::clone(&shared),
//! });
//!
//! session.release().unwrap();
//! assert!(session.is_released());
//! assert!(session.socket.0.read());
//! assert!(!session.spare.is_present());
//! assert!(!shared.0.read());
//! ```

mod cascade;
mod owned;
#[doc(hidden)]
pub mod dispatch;
mod reclaim;

use core::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::concurrency::atomic::AtomicCell;
use crate::error::{ReleaseError, ReleasedError};
use crate::observer::WeakObserverRegistry;

pub use cascade::{Cascade, FieldOutcome, FieldVisit, OwnedState, ReleaseReport, Walker};
pub use owned::Owned;
pub use reclaim::{reclaim_keyed, KeyedContainer, OwnedField, Reclaim, Side, SideOutcome};

/// An object that holds resources and can give them up.
pub trait Release {
    /// Releases the held resources.
    ///
    /// Implementations should tolerate being called more than once.
    ///
    /// # Errors
    /// [`ReleaseError::AlreadyGone`] if the resource was released concurrently
    /// by another path, [`ReleaseError::Failed`] for anything else.
    fn release(&self) -> Result<(), ReleaseError>;

    /// Whether there is anything to release. Empty optional wrappers return
    /// `false` and are skipped by the cascade.
    fn holds_resource(&self) -> bool {
        true
    }
}

impl<R: Release + ?Sized> Release for Arc<R> {
    fn release(&self) -> Result<(), ReleaseError> {
        (**self).release()
    }

    fn holds_resource(&self) -> bool {
        (**self).holds_resource()
    }
}

impl<R: Release + ?Sized> Release for Box<R> {
    fn release(&self) -> Result<(), ReleaseError> {
        (**self).release()
    }

    fn holds_resource(&self) -> bool {
        (**self).holds_resource()
    }
}

impl<R: Release> Release for Option<R> {
    fn release(&self) -> Result<(), ReleaseError> {
        match self {
            Some(resource) => resource.release(),
            None => Ok(()),
        }
    }

    fn holds_resource(&self) -> bool {
        self.as_ref().is_some_and(Release::holds_resource)
    }
}

/// A [`Release`] object whose progress can be observed.
pub trait QueryRelease: Release {
    /// `true` once release has completed.
    fn is_released(&self) -> bool;

    /// `true` while release is in progress.
    fn is_releasing(&self) -> bool;
}

/// A [`QueryRelease`] object that announces the start of its release.
pub trait NotifyRelease: QueryRelease {
    /// Handlers invoked once, when release begins, with the object as sender.
    fn releasing(&self) -> &WeakObserverRegistry<ReleaseEvent>;
}

/// Payload of the release-beginning notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseEvent {
    /// The type name of the object being released.
    pub type_name: &'static str,
}

/// The release flags and listener list behind every release-gated object.
pub struct Lifecycle {
    /// One-way claim; never cleared.
    started: AtomicCell<bool>,
    released: AtomicCell<bool>,
    releasing: AtomicCell<bool>,
    listeners: WeakObserverRegistry<ReleaseEvent>,
}

impl Lifecycle {
    /// A live lifecycle.
    pub fn new() -> Self {
        Self {
            started: AtomicCell::new(false),
            released: AtomicCell::new(false),
            releasing: AtomicCell::new(false),
            listeners: WeakObserverRegistry::new(),
        }
    }

    /// `true` once [`run`](Self::run) has completed.
    pub fn is_released(&self) -> bool {
        self.released.read()
    }

    /// `true` while [`run`](Self::run) is executing.
    pub fn is_releasing(&self) -> bool {
        self.releasing.read()
    }

    /// The release-beginning listeners.
    pub fn listeners(&self) -> &WeakObserverRegistry<ReleaseEvent> {
        &self.listeners
    }

    /// Fails once release has completed.
    ///
    /// # Errors
    /// [`ReleasedError`] naming `type_name`.
    pub fn check_live(&self, type_name: &'static str) -> Result<(), ReleasedError> {
        if self.is_released() {
            Err(ReleasedError::new(type_name))
        } else {
            Ok(())
        }
    }

    /// Runs `teardown` exactly once across all callers.
    ///
    /// The winning caller notifies the listeners with `sender`, runs
    /// `teardown`, then marks the lifecycle released, even if `teardown`
    /// failed. Every other caller, concurrent or late, returns `Ok(false)`
    /// immediately.
    ///
    /// # Errors
    /// Whatever `teardown` returned.
    pub fn run<F>(
        &self,
        sender: &dyn Any,
        type_name: &'static str,
        teardown: F,
    ) -> Result<bool, ReleaseError>
    where
        F: FnOnce() -> Result<(), ReleaseError>,
    {
        if !self.started.claim() {
            return Ok(false);
        }
        self.releasing.write(true);

        debug!(type_name, "release started");
        self.listeners.invoke(sender, &ReleaseEvent { type_name });
        let outcome = teardown();

        self.released.write(true);
        self.releasing.write(false);

        match &outcome {
            Ok(()) => debug!(type_name, "release finished"),
            Err(err) => debug!(type_name, error = %err, "release finished with error"),
        }
        outcome.map(|()| true)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("released", &self.is_released())
            .field("releasing", &self.is_releasing())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Handler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_run_is_exactly_once_under_contention() {
        let lifecycle = Lifecycle::new();
        let runs = AtomicUsize::new(0);
        let winners = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    let won = lifecycle
                        .run(&(), "Test", || {
                            runs.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                    if won {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(lifecycle.is_released());
        assert!(!lifecycle.is_releasing());
    }

    #[test]
    fn test_late_callers_never_rerun_teardown() {
        const THREADS: usize = 16;
        const LIFECYCLES: usize = 20_000;

        let lifecycles: Vec<Lifecycle> = (0..LIFECYCLES).map(|_| Lifecycle::new()).collect();
        let runs: Vec<AtomicUsize> = (0..LIFECYCLES).map(|_| AtomicUsize::new(0)).collect();
        let barrier = Barrier::new(THREADS);

        thread::scope(|s| {
            for offset in 0..THREADS {
                let (lifecycles, runs, barrier) = (&lifecycles, &runs, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    // Staggered starting points.
                    for i in 0..LIFECYCLES {
                        let index = (i + offset * 7) % LIFECYCLES;
                        lifecycles[index]
                            .run(&(), "Test", || {
                                runs[index].fetch_add(1, Ordering::SeqCst);
                                thread::yield_now();
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });

        let repeated = runs
            .iter()
            .filter(|count| count.load(Ordering::SeqCst) != 1)
            .count();
        assert_eq!(repeated, 0);
        assert!(lifecycles.iter().all(|l| l.is_released() && !l.is_releasing()));
    }

    #[test]
    fn test_failed_teardown_still_marks_released() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle
            .run(&(), "Test", || Err(ReleaseError::failed(anyhow::anyhow!("boom"))))
            .unwrap_err();
        assert!(!err.is_already_gone());
        assert!(lifecycle.is_released());
        assert_eq!(
            lifecycle.check_live("Test"),
            Err(ReleasedError::new("Test"))
        );
        assert!(!lifecycle.run(&(), "Test", || Ok(())).unwrap());
    }

    #[test]
    fn test_reentrant_run_is_refused_while_releasing() {
        let lifecycle = Lifecycle::new();
        let nested = lifecycle
            .run(&(), "Test", || {
                assert!(lifecycle.is_releasing());
                assert!(!lifecycle.is_released());
                assert!(!lifecycle.run(&(), "Test", || Ok(())).unwrap());
                Ok(())
            })
            .unwrap();
        assert!(nested);
        assert!(!lifecycle.run(&(), "Test", || Ok(())).unwrap());
    }

    #[test]
    fn test_listeners_see_releasing_flag() {
        struct Watcher {
            seen: AtomicUsize,
        }

        impl Watcher {
            fn on_releasing(&self, _sender: &dyn Any, event: &ReleaseEvent) {
                assert_eq!(event.type_name, "Test");
                self.seen.fetch_add(1, Ordering::SeqCst);
            }
        }

        let lifecycle = Lifecycle::new();
        let watcher = Arc::new(Watcher {
            seen: AtomicUsize::new(0),
        });
        lifecycle
            .listeners()
            .add(Handler::from_method(&watcher, Watcher::on_releasing));

        lifecycle.run(&(), "Test", || Ok(())).unwrap();
        lifecycle.run(&(), "Test", || Ok(())).unwrap();
        assert_eq!(watcher.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forwarding_impls() {
        struct Counted(AtomicUsize);

        impl Release for Counted {
            fn release(&self) -> Result<(), ReleaseError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let shared = Arc::new(Counted(AtomicUsize::new(0)));
        shared.release().unwrap();
        Some(Arc::clone(&shared)).release().unwrap();
        None::<Arc<Counted>>.release().unwrap();
        assert_eq!(shared.0.load(Ordering::SeqCst), 2);

        assert!(Some(Arc::clone(&shared)).holds_resource());
        assert!(!None::<Arc<Counted>>.holds_resource());

        let boxed: Box<dyn Release> = Box::new(Counted(AtomicUsize::new(0)));
        boxed.release().unwrap();
    }
}
