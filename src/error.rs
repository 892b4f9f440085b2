//! Error types shared by the lock, the observer registry and the release cascade.

use core::fmt;

use crate::concurrency::sync::{LockMode, LockTimeout};

/// Signals that an operation was attempted on an object whose release has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasedError {
    type_name: &'static str,
}

impl ReleasedError {
    /// Creates the error for an object of the named type.
    pub const fn new(type_name: &'static str) -> Self {
        Self { type_name }
    }

    /// The type name of the released object.
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for ReleasedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot access a released object of type `{}`", self.type_name)
    }
}

impl std::error::Error for ReleasedError {}

/// Errors raised by [`TimedRwLock`](crate::concurrency::sync::TimedRwLock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The timeout is neither [`LockTimeout::NEVER`] nor within `0..=i32::MAX` milliseconds.
    InvalidTimeout {
        /// The rejected timeout.
        timeout: LockTimeout,
    },
    /// A blocking acquisition expired before the mode was obtained.
    TimeoutElapsed {
        /// The mode that was requested.
        mode: LockMode,
        /// The timeout that elapsed.
        timeout: LockTimeout,
    },
    /// The calling thread already holds a mode that forbids the requested one.
    Recursion {
        /// The mode that was requested.
        requested: LockMode,
        /// The mode the calling thread already holds.
        held: LockMode,
    },
    /// The lock has been released.
    Released(ReleasedError),
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeout { timeout } => write!(
                f,
                "invalid lock timeout {timeout}: expected -1 (never) or 0..={} milliseconds",
                i32::MAX
            ),
            Self::TimeoutElapsed { mode, timeout } => {
                write!(f, "timeout of {timeout} elapsed before the {mode} lock was obtained")
            }
            Self::Recursion { requested, held } => write!(
                f,
                "lock recursion: a thread holding the {held} lock may not enter the {requested} lock"
            ),
            Self::Released(inner) => inner.fmt(f),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Released(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ReleasedError> for LockError {
    fn from(inner: ReleasedError) -> Self {
        Self::Released(inner)
    }
}

/// Errors raised while releasing a resource.
#[derive(Debug)]
pub enum ReleaseError {
    /// The resource was already torn down by another path.
    ///
    /// The cascade tolerates this per element and keeps walking.
    AlreadyGone,
    /// Any other teardown failure. Never swallowed.
    Failed(anyhow::Error),
}

impl ReleaseError {
    /// Wraps an arbitrary failure.
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        Self::Failed(error.into())
    }

    /// Returns `true` for the tolerated [`ReleaseError::AlreadyGone`] race.
    pub fn is_already_gone(&self) -> bool {
        matches!(self, Self::AlreadyGone)
    }
}

impl fmt::Display for ReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyGone => f.write_str("resource was already released by another path"),
            Self::Failed(error) => write!(f, "release failed: {error:#}"),
        }
    }
}

impl std::error::Error for ReleaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AlreadyGone => None,
            Self::Failed(error) => Some(&**error),
        }
    }
}
