use core::{
    cmp::Ordering as CmpOrdering,
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

use super::AtomicScalar;

/// A lock-free cell holding one scalar.
///
/// Every read observes the value either before or after any given write,
/// never a torn intermediate. Writes and exchanges are sequentially
/// consistent, so `exchange` doubles as a multiple-writer gate: exactly one
/// of any number of racing `exchange(true)` calls on a `false` cell observes
/// `false`.
#[repr(transparent)]
pub struct AtomicCell<T: AtomicScalar> {
    bits: AtomicU64,
    _value: PhantomData<T>,
}

impl<T: AtomicScalar> AtomicCell<T> {
    /// Creates a cell holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            bits: AtomicU64::new(value.into_bits()),
            _value: PhantomData,
        }
    }

    /// Reads the current value.
    #[inline(always)]
    pub fn read(&self) -> T {
        T::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Installs `value`.
    #[inline(always)]
    pub fn write(&self, value: T) {
        self.bits.store(value.into_bits(), Ordering::SeqCst);
    }

    /// Installs `value` and returns the prior value as one indivisible step.
    #[inline(always)]
    pub fn exchange(&self, value: T) -> T {
        T::from_bits(self.bits.swap(value.into_bits(), Ordering::SeqCst))
    }

    /// Installs `new` if the cell currently holds `current`.
    ///
    /// Comparison is on the packed bit pattern.
    ///
    /// # Errors
    /// Returns the value actually held when it differs from `current`.
    #[inline]
    pub fn compare_exchange(&self, current: T, new: T) -> Result<T, T> {
        self.bits
            .compare_exchange(
                current.into_bits(),
                new.into_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(T::from_bits)
            .map_err(T::from_bits)
    }

    /// Consumes the cell, returning the contained value.
    #[inline]
    pub fn into_inner(self) -> T {
        T::from_bits(self.bits.into_inner())
    }
}

impl AtomicCell<bool> {
    /// Sets the flag and reports whether this call was the one that flipped it.
    ///
    /// Exactly one of any number of concurrent callers on an unset flag gets `true`.
    #[inline]
    pub fn claim(&self) -> bool {
        !self.exchange(true)
    }
}

impl<T: AtomicScalar + Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: AtomicScalar> From<T> for AtomicCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: AtomicScalar + fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCell").field(&self.read()).finish()
    }
}

impl<T: AtomicScalar + fmt::Display> fmt::Display for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read().fmt(f)
    }
}

impl<T: AtomicScalar + PartialEq> PartialEq for AtomicCell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.read() == other.read()
    }
}

impl<T: AtomicScalar + PartialEq> PartialEq<T> for AtomicCell<T> {
    fn eq(&self, other: &T) -> bool {
        self.read() == *other
    }
}

impl<T: AtomicScalar + PartialOrd> PartialOrd for AtomicCell<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        self.read().partial_cmp(&other.read())
    }
}

impl<T: AtomicScalar + PartialOrd> PartialOrd<T> for AtomicCell<T> {
    fn partial_cmp(&self, other: &T) -> Option<CmpOrdering> {
        self.read().partial_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[test]
    fn test_write_read_exchange() {
        let cell = AtomicCell::new(Duration::from_secs(1));
        cell.write(Duration::from_millis(5));
        assert_eq!(cell.read(), Duration::from_millis(5));
        assert_eq!(cell.exchange(Duration::ZERO), Duration::from_millis(5));
        assert_eq!(cell, Duration::ZERO);
    }

    #[test]
    fn test_comparisons_delegate_to_the_scalar() {
        let early = AtomicCell::new(UNIX_EPOCH);
        let late = AtomicCell::new(UNIX_EPOCH + Duration::from_secs(60));
        assert!(early < late);
        assert!(late > UNIX_EPOCH);
        assert!(early <= UNIX_EPOCH);
        assert_ne!(early, late);
        assert!(AtomicCell::new(false) < AtomicCell::new(true));
    }

    #[test]
    fn test_compare_exchange_reports_the_actual_value() {
        let cell = AtomicCell::new(7u32);
        assert_eq!(cell.compare_exchange(1, 2), Err(7));
        assert_eq!(cell.compare_exchange(7, 2), Ok(7));
        assert_eq!(cell.into_inner(), 2);
    }

    #[test]
    fn test_display_and_debug_show_the_value() {
        let cell = AtomicCell::new(true);
        assert_eq!(cell.to_string(), "true");
        assert_eq!(format!("{cell:?}"), "AtomicCell(true)");
    }

    #[test]
    fn test_claim_has_a_single_winner() {
        const THREADS: usize = 16;
        let flag = AtomicCell::new(false);
        let barrier = Barrier::new(THREADS);
        let winners = AtomicCell::new(0usize);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    if flag.claim() {
                        loop {
                            let seen = winners.read();
                            if winners.compare_exchange(seen, seen + 1).is_ok() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        assert_eq!(winners.read(), 1);
        assert!(flag.read());
    }

    #[test]
    fn test_timestamps_are_stored_exactly() {
        let now = SystemTime::now();
        let cell = AtomicCell::new(UNIX_EPOCH);
        cell.write(now);
        assert_eq!(cell.read(), now);
    }
}
