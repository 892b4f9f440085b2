//! Lock timeouts expressed in signed milliseconds.

use core::fmt;
use std::time::Duration;

/// How long a lock acquisition may block.
///
/// Valid values are [`LockTimeout::NEVER`] (`-1`, block indefinitely) and
/// `0..=`[`LockTimeout::MAX_MILLIS`]. Anything else is representable so it
/// can be reported back in [`LockError::InvalidTimeout`](crate::LockError),
/// but every acquisition rejects it before blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockTimeout {
    millis: i64,
}

impl LockTimeout {
    /// Block until the mode is obtained.
    pub const NEVER: Self = Self { millis: -1 };

    /// Try once without blocking.
    pub const ZERO: Self = Self { millis: 0 };

    /// The largest accepted finite timeout, in milliseconds.
    pub const MAX_MILLIS: i64 = i32::MAX as i64;

    /// Creates a timeout from signed milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// The timeout in signed milliseconds.
    pub const fn as_millis(self) -> i64 {
        self.millis
    }

    /// Returns `true` for [`LockTimeout::NEVER`].
    pub const fn is_never(self) -> bool {
        self.millis == -1
    }

    /// Returns `true` if acquisitions accept this timeout.
    pub const fn is_valid(self) -> bool {
        self.millis >= -1 && self.millis <= Self::MAX_MILLIS
    }

    /// The finite wait, or `None` for [`LockTimeout::NEVER`] and invalid values.
    pub fn as_duration(self) -> Option<Duration> {
        u64::try_from(self.millis).ok().map(Duration::from_millis)
    }
}

impl Default for LockTimeout {
    fn default() -> Self {
        Self::NEVER
    }
}

/// Whole milliseconds, truncated; durations beyond `i64::MAX` ms saturate
/// (and are then rejected as invalid).
impl From<Duration> for LockTimeout {
    fn from(duration: Duration) -> Self {
        Self::from_millis(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            f.write_str("never")
        } else {
            write!(f, "{}ms", self.millis)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_bounds() {
        assert!(LockTimeout::NEVER.is_valid());
        assert!(LockTimeout::ZERO.is_valid());
        assert!(LockTimeout::from_millis(LockTimeout::MAX_MILLIS).is_valid());
        assert!(!LockTimeout::from_millis(LockTimeout::MAX_MILLIS + 1).is_valid());
        assert!(!LockTimeout::from_millis(-2).is_valid());
        assert!(!LockTimeout::from(Duration::MAX).is_valid());
    }

    #[test]
    fn test_durations_truncate_to_millis() {
        assert_eq!(LockTimeout::from(Duration::from_micros(5_900)).as_millis(), 5);
        assert_eq!(LockTimeout::NEVER.as_duration(), None);
        assert_eq!(
            LockTimeout::from_millis(50).as_duration(),
            Some(Duration::from_millis(50))
        );
        assert_eq!(LockTimeout::NEVER.to_string(), "never");
        assert_eq!(LockTimeout::from_millis(5).to_string(), "5ms");
    }
}
