use core::fmt;
use core::marker::PhantomData;
use std::thread::ThreadId;

use super::{LockMode, TimedRwLock};
use crate::concurrency::atomic::AtomicCell;

/// Proof of one successful [`TimedRwLock`] acquisition.
///
/// Releasing the token (explicitly or by dropping it) exits exactly the mode
/// it was issued for. Releasing more than once is a no-op. The token is tied
/// to the acquiring thread and cannot be sent elsewhere.
#[must_use = "the lock is exited as soon as the token is dropped"]
pub struct ReleaseToken<'a> {
    lock: &'a TimedRwLock,
    mode: LockMode,
    owner: ThreadId,
    released: AtomicCell<bool>,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ReleaseToken<'a> {
    pub(super) fn new(lock: &'a TimedRwLock, mode: LockMode, owner: ThreadId) -> Self {
        Self {
            lock,
            mode,
            owner,
            released: AtomicCell::new(false),
            _not_send: PhantomData,
        }
    }

    /// The mode this token holds.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Returns `true` once the token has been released.
    pub fn is_released(&self) -> bool {
        self.released.read()
    }

    /// Exits the held mode. Later calls do nothing.
    pub fn release(&self) {
        if self.released.claim() {
            self.lock.exit(self.owner, self.mode);
        }
    }
}

impl Drop for ReleaseToken<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ReleaseToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseToken")
            .field("mode", &self.mode)
            .field("released", &self.is_released())
            .finish()
    }
}
