//! Blocking synchronization with bounded waits.
//!
//! [`TimedRwLock`] is a non-recursive reader/writer lock whose every
//! acquisition takes a [`LockTimeout`] and hands back a [`ReleaseToken`].

mod rwlock;
mod timeout;
mod token;

pub use rwlock::{LockDiagnostics, LockMode, TimedRwLock};
pub use timeout::LockTimeout;
pub use token::ReleaseToken;
