use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;

use core::fmt;

use tracing::{debug, trace};

use super::{LockTimeout, ReleaseToken};
use crate::error::{LockError, ReleaseError, ReleasedError};
use crate::lifecycle::{Lifecycle, NotifyRelease, QueryRelease, Release, ReleaseEvent};
use crate::observer::WeakObserverRegistry;

const TYPE_NAME: &str = "TimedRwLock";

/// The three ways a thread can hold a [`TimedRwLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared read access.
    Read,
    /// Shared read access that may later be upgraded to write without releasing.
    UpgradeableRead,
    /// Exclusive access.
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::UpgradeableRead => "upgradeable read",
            Self::Write => "write",
        })
    }
}

/// A point-in-time view of a [`TimedRwLock`].
///
/// Observational only: by the time it is returned another thread may have
/// changed the lock. Never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockDiagnostics {
    /// Threads currently holding read mode.
    pub current_read_count: usize,
    /// Threads blocked waiting for read mode.
    pub waiting_read_count: usize,
    /// Threads blocked waiting for write mode, upgrading holders included.
    pub waiting_write_count: usize,
    /// Threads blocked waiting for upgradeable mode.
    pub waiting_upgradeable_count: usize,
    /// The calling thread holds read mode.
    pub is_read_lock_held: bool,
    /// The calling thread holds upgradeable mode.
    pub is_upgradeable_lock_held: bool,
    /// The calling thread holds write mode.
    pub is_write_lock_held: bool,
}

#[derive(Default)]
struct LockState {
    readers: HashSet<ThreadId>,
    writer: Option<ThreadId>,
    upgradeable: Option<ThreadId>,
    waiting_read: usize,
    waiting_write: usize,
    waiting_upgradeable: usize,
    torn_down: bool,
}

impl LockState {
    fn held_by(&self, thread: ThreadId) -> Option<LockMode> {
        if self.writer == Some(thread) {
            Some(LockMode::Write)
        } else if self.upgradeable == Some(thread) {
            Some(LockMode::UpgradeableRead)
        } else if self.readers.contains(&thread) {
            Some(LockMode::Read)
        } else {
            None
        }
    }

    /// No mode may be entered twice and nothing may be entered on top of an
    /// existing hold, except write on top of upgradeable. Read on top of
    /// upgradeable is refused even though many platform locks allow it.
    fn check_recursion(&self, thread: ThreadId, requested: LockMode) -> Result<(), LockError> {
        match (requested, self.held_by(thread)) {
            (_, None) | (LockMode::Write, Some(LockMode::UpgradeableRead)) => Ok(()),
            (requested, Some(held)) => Err(LockError::Recursion { requested, held }),
        }
    }

    // Waiting writers hold back new readers and upgraders so a steady stream
    // of readers cannot starve them.
    fn try_grant(&mut self, thread: ThreadId, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => {
                if self.writer.is_none() && self.waiting_write == 0 {
                    self.readers.insert(thread);
                    return true;
                }
            }
            LockMode::UpgradeableRead => {
                if self.writer.is_none() && self.upgradeable.is_none() && self.waiting_write == 0 {
                    self.upgradeable = Some(thread);
                    return true;
                }
            }
            LockMode::Write => {
                if self.writer.is_none()
                    && self.readers.is_empty()
                    && self.upgradeable.map_or(true, |holder| holder == thread)
                {
                    self.writer = Some(thread);
                    return true;
                }
            }
        }
        false
    }

    fn waiting_mut(&mut self, mode: LockMode) -> &mut usize {
        match mode {
            LockMode::Read => &mut self.waiting_read,
            LockMode::UpgradeableRead => &mut self.waiting_upgradeable,
            LockMode::Write => &mut self.waiting_write,
        }
    }

    fn exit(&mut self, thread: ThreadId, mode: LockMode) {
        match mode {
            LockMode::Read => {
                self.readers.remove(&thread);
            }
            LockMode::UpgradeableRead => {
                if self.upgradeable == Some(thread) {
                    self.upgradeable = None;
                }
            }
            LockMode::Write => {
                if self.writer == Some(thread) {
                    self.writer = None;
                }
            }
        }
    }

    fn diagnostics(&self, thread: ThreadId) -> LockDiagnostics {
        LockDiagnostics {
            current_read_count: self.readers.len(),
            waiting_read_count: self.waiting_read,
            waiting_write_count: self.waiting_write,
            waiting_upgradeable_count: self.waiting_upgradeable,
            is_read_lock_held: self.readers.contains(&thread),
            is_upgradeable_lock_held: self.upgradeable == Some(thread),
            is_write_lock_held: self.writer == Some(thread),
        }
    }
}

/// A multi-reader/single-writer lock with bounded waits and an upgradeable mode.
///
/// # States
/// - Unheld
/// - Read(n): any number of threads share the lock
/// - Upgradeable: one thread, coexisting with readers, may move to Write
/// - Write: one thread, excluding everything else
///
/// Recursion is never allowed. The one permitted nesting is an upgradeable
/// holder entering write mode; that holder may **not** enter read mode.
///
/// Every acquisition returns a [`ReleaseToken`] that restores the prior
/// state when released or dropped.
///
/// The lock itself is a [`Release`] object: once released, every operation
/// fails with [`LockError::Released`] and blocked waiters are woken with the
/// same error.
pub struct TimedRwLock {
    state: Mutex<LockState>,
    changed: Condvar,
    lifecycle: Lifecycle,
}

impl TimedRwLock {
    /// The sentinel timeout that blocks indefinitely.
    pub const TIMEOUT_NEVER: LockTimeout = LockTimeout::NEVER;

    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Returns `true` if `timeout` is [`LockTimeout::NEVER`] or within `0..=i32::MAX` ms.
    pub const fn is_valid_timeout(timeout: LockTimeout) -> bool {
        timeout.is_valid()
    }

    /// Always `false`: this lock never permits recursive acquisition.
    pub const fn allows_recursion(&self) -> bool {
        false
    }

    /// Enters read mode, blocking indefinitely.
    ///
    /// # Errors
    /// See [`TimedRwLock::enter_read`].
    pub fn read(&self) -> Result<ReleaseToken<'_>, LockError> {
        self.enter_read(LockTimeout::NEVER)
    }

    /// Enters write mode, blocking indefinitely.
    ///
    /// # Errors
    /// See [`TimedRwLock::enter_write`].
    pub fn write(&self) -> Result<ReleaseToken<'_>, LockError> {
        self.enter_write(LockTimeout::NEVER)
    }

    /// Enters upgradeable mode, blocking indefinitely.
    ///
    /// # Errors
    /// See [`TimedRwLock::enter_upgradeable_read`].
    pub fn upgradeable_read(&self) -> Result<ReleaseToken<'_>, LockError> {
        self.enter_upgradeable_read(LockTimeout::NEVER)
    }

    /// Enters read mode, blocking for at most `timeout`.
    ///
    /// # Errors
    /// - [`LockError::Released`] if the lock has been released.
    /// - [`LockError::InvalidTimeout`] if `timeout` is out of range.
    /// - [`LockError::Recursion`] if the calling thread holds any mode,
    ///   upgradeable included.
    /// - [`LockError::TimeoutElapsed`] if the wait expired.
    pub fn enter_read(&self, timeout: LockTimeout) -> Result<ReleaseToken<'_>, LockError> {
        self.enter(LockMode::Read, timeout)
    }

    /// Enters write mode, blocking for at most `timeout`.
    ///
    /// An upgradeable holder calling this upgrades in place.
    ///
    /// # Errors
    /// As [`TimedRwLock::enter_read`], except that holding upgradeable mode is allowed.
    pub fn enter_write(&self, timeout: LockTimeout) -> Result<ReleaseToken<'_>, LockError> {
        self.enter(LockMode::Write, timeout)
    }

    /// Enters upgradeable mode, blocking for at most `timeout`.
    ///
    /// # Errors
    /// As [`TimedRwLock::enter_read`].
    pub fn enter_upgradeable_read(
        &self,
        timeout: LockTimeout,
    ) -> Result<ReleaseToken<'_>, LockError> {
        self.enter(LockMode::UpgradeableRead, timeout)
    }

    /// Tries to enter read mode within `timeout`; `Ok(None)` if it expired.
    ///
    /// # Errors
    /// As [`TimedRwLock::enter_read`], minus [`LockError::TimeoutElapsed`].
    pub fn try_enter_read(
        &self,
        timeout: LockTimeout,
    ) -> Result<Option<ReleaseToken<'_>>, LockError> {
        self.acquire(LockMode::Read, timeout)
    }

    /// Tries to enter write mode within `timeout`; `Ok(None)` if it expired.
    ///
    /// # Errors
    /// As [`TimedRwLock::enter_write`], minus [`LockError::TimeoutElapsed`].
    pub fn try_enter_write(
        &self,
        timeout: LockTimeout,
    ) -> Result<Option<ReleaseToken<'_>>, LockError> {
        self.acquire(LockMode::Write, timeout)
    }

    /// Tries to enter upgradeable mode within `timeout`; `Ok(None)` if it expired.
    ///
    /// # Errors
    /// As [`TimedRwLock::enter_upgradeable_read`], minus [`LockError::TimeoutElapsed`].
    pub fn try_enter_upgradeable_read(
        &self,
        timeout: LockTimeout,
    ) -> Result<Option<ReleaseToken<'_>>, LockError> {
        self.acquire(LockMode::UpgradeableRead, timeout)
    }

    /// Number of threads holding read mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn current_read_count(&self) -> Result<usize, LockError> {
        self.diagnostics().map(|d| d.current_read_count)
    }

    /// Number of threads blocked waiting for read mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn waiting_read_count(&self) -> Result<usize, LockError> {
        self.diagnostics().map(|d| d.waiting_read_count)
    }

    /// Number of threads blocked waiting for write mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn waiting_write_count(&self) -> Result<usize, LockError> {
        self.diagnostics().map(|d| d.waiting_write_count)
    }

    /// Number of threads blocked waiting for upgradeable mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn waiting_upgradeable_count(&self) -> Result<usize, LockError> {
        self.diagnostics().map(|d| d.waiting_upgradeable_count)
    }

    /// Whether the calling thread holds read mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn is_read_lock_held(&self) -> Result<bool, LockError> {
        self.diagnostics().map(|d| d.is_read_lock_held)
    }

    /// Whether the calling thread holds upgradeable mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn is_upgradeable_lock_held(&self) -> Result<bool, LockError> {
        self.diagnostics().map(|d| d.is_upgradeable_lock_held)
    }

    /// Whether the calling thread holds write mode.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn is_write_lock_held(&self) -> Result<bool, LockError> {
        self.diagnostics().map(|d| d.is_write_lock_held)
    }

    /// Snapshot of every diagnostic counter, taken under one internal lock.
    ///
    /// # Errors
    /// [`LockError::Released`] once the lock is released.
    pub fn diagnostics(&self) -> Result<LockDiagnostics, LockError> {
        self.check_live()?;
        Ok(self.lock_state().diagnostics(thread::current().id()))
    }

    fn check_live(&self) -> Result<(), LockError> {
        self.lifecycle.check_live(TYPE_NAME).map_err(LockError::from)
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, mode: LockMode, timeout: LockTimeout) -> Result<ReleaseToken<'_>, LockError> {
        self.acquire(mode, timeout)?
            .ok_or(LockError::TimeoutElapsed { mode, timeout })
    }

    fn acquire(
        &self,
        mode: LockMode,
        timeout: LockTimeout,
    ) -> Result<Option<ReleaseToken<'_>>, LockError> {
        self.check_live()?;
        if !timeout.is_valid() {
            return Err(LockError::InvalidTimeout { timeout });
        }

        let thread = thread::current().id();
        let deadline = timeout.as_duration().map(|wait| Instant::now() + wait);

        let mut state = self.lock_state();
        state.check_recursion(thread, mode)?;

        *state.waiting_mut(mode) += 1;
        let outcome = loop {
            if state.torn_down {
                break Err(LockError::Released(ReleasedError::new(TYPE_NAME)));
            }
            if state.try_grant(thread, mode) {
                break Ok(true);
            }
            match deadline {
                None => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break Ok(false);
                    }
                    state = self
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        };
        *state.waiting_mut(mode) -= 1;
        drop(state);

        match outcome {
            Ok(true) => {
                trace!(%mode, "lock entered");
                Ok(Some(ReleaseToken::new(self, mode, thread)))
            }
            Ok(false) => {
                // A writer giving up may unblock readers held back for it.
                self.changed.notify_all();
                debug!(%mode, %timeout, "lock timeout elapsed");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub(super) fn exit(&self, thread: ThreadId, mode: LockMode) {
        self.lock_state().exit(thread, mode);
        self.changed.notify_all();
        trace!(%mode, "lock exited");
    }
}

impl Default for TimedRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimedRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("TimedRwLock")
            .field("readers", &state.readers.len())
            .field("writer", &state.writer.is_some())
            .field("upgradeable", &state.upgradeable.is_some())
            .field("released", &self.lifecycle.is_released())
            .finish()
    }
}

impl Release for TimedRwLock {
    fn release(&self) -> Result<(), ReleaseError> {
        self.lifecycle
            .run(self, TYPE_NAME, || {
                let mut state = self.lock_state();
                state.torn_down = true;
                debug!(
                    readers = state.readers.len(),
                    writer = state.writer.is_some(),
                    waiting = state.waiting_read + state.waiting_write + state.waiting_upgradeable,
                    "timed rwlock released"
                );
                drop(state);
                self.changed.notify_all();
                Ok(())
            })
            .map(drop)
    }
}

impl QueryRelease for TimedRwLock {
    fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    fn is_releasing(&self) -> bool {
        self.lifecycle.is_releasing()
    }
}

impl NotifyRelease for TimedRwLock {
    fn releasing(&self) -> &WeakObserverRegistry<ReleaseEvent> {
        self.lifecycle.listeners()
    }
}
