//! # `warden` - Resource Lifecycle and Concurrency Toolkit
//!
//! Primitives for objects that own resources and are shared between threads:
//! atomic scalar cells, a timed non-recursive reader/writer lock, a weak
//! observer registry and an exactly-once release cascade.
//!
//! ## Guarantees
//!
//! ### Release
//! - **Exactly once**: every release-gated object runs its teardown once, no
//!   matter how many threads call `release` or in what order.
//! - **Released means released**: `released` is raised before `releasing` is
//!   lowered, so a late caller never re-enters teardown.
//! - **Ownership is explicit**: the cascade releases only fields it owns;
//!   `#[release(not_owned)]` opts a field out at compile time.
//!
//! ### Concurrency
//! - **Lock-free flags**: [`AtomicCell`] never blocks; `exchange` is the
//!   single-winner gate behind every release.
//! - **Bounded waits**: every [`TimedRwLock`] acquisition takes a timeout and
//!   fails with a typed error instead of hanging.
//! - **No accidental recursion**: re-entering a held lock is an error, and so
//!   is reading under an upgradeable hold.
//! - **Writers are not starved**: a waiting writer holds back new readers.
//!
//! ### Subscriptions
//! - **Weak by default**: [`WeakObserverRegistry`] never keeps an instance
//!   subscriber alive and prunes dead ones on dispatch.
//!
//! ## Architecture
//!
//! 1. **Atomics** (`AtomicCell<T>`): one `AtomicU64` per scalar, including
//!    durations and timestamps.
//! 2. **Locks** (`TimedRwLock`, `ReleaseToken`): a condvar-backed lock with
//!    RAII tokens that cannot leave the acquiring thread.
//! 3. **Observers** (`WeakObserverRegistry<A>`, `Handler<A>`): copy-on-write
//!    handler lists over `arc-swap`.
//! 4. **Lifecycle** (`Release`, `Lifecycle`, `Cascade<S>`,
//!    `#[derive(OwnedState)]`): the release gate and the generated field walk.
//!
//! ## Example
//!
//! ```rust
//! use warden::{LockTimeout, TimedRwLock};
//!
//! let lock = TimedRwLock::new();
//! {
//!     let _read = lock.enter_read(LockTimeout::from_millis(100)).unwrap();
//!     assert_eq!(lock.current_read_count().unwrap(), 1);
//! }
//! let write = lock.try_enter_write(LockTimeout::ZERO).unwrap();
//! assert!(write.is_some());
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

// Lets `#[derive(OwnedState)]` expand to `::warden::...` inside this crate too.
extern crate self as warden;

pub mod concurrency;
pub mod error;
pub mod lifecycle;
pub mod observer;

pub use concurrency::atomic::{AtomicCell, AtomicScalar};
pub use concurrency::sync::{LockDiagnostics, LockMode, LockTimeout, ReleaseToken, TimedRwLock};
pub use error::{LockError, ReleaseError, ReleasedError};
pub use lifecycle::{
    Cascade, Lifecycle, NotifyRelease, Owned, OwnedField, OwnedState, QueryRelease, Release,
    ReleaseEvent, ReleaseReport,
};
pub use observer::{Handler, HandlerIdentity, WeakObserverRegistry};
pub use warden_macros::OwnedState;

// Compile-time assertions for memory layout
const _: () = {
    use core::mem;

    // Cells are a bare AtomicU64 whatever the scalar.
    assert!(mem::size_of::<AtomicCell<bool>>() == mem::size_of::<u64>());
    assert!(mem::size_of::<AtomicCell<std::time::Duration>>() == mem::size_of::<u64>());
    assert!(mem::align_of::<AtomicCell<bool>>() == mem::align_of::<core::sync::atomic::AtomicU64>());

    // A lock timeout is a plain millisecond count.
    assert!(mem::size_of::<LockTimeout>() == mem::size_of::<i64>());
};
