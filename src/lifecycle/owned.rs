use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{OwnedField, Reclaim, Release};
use crate::error::ReleaseError;

/// A field slot the cascade can clear through a shared reference.
///
/// After the cascade releases the value it drops it and leaves the slot empty,
/// so a released object no longer pins what it owned.
pub struct Owned<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Owned<T> {
    /// A slot holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
        }
    }

    /// An empty slot.
    pub const fn empty() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// `true` while the slot holds a value.
    pub fn is_present(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs `f` on the value, if present.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().as_ref().map(f)
    }

    /// Runs `f` on the value mutably, if present.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    /// Stores `value` and returns the previous one.
    pub fn replace(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    /// Empties the slot.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Consumes the slot.
    pub fn into_inner(self) -> Option<T> {
        self.slot.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Owned<T> {
    /// A clone of the value, if present.
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }
}

impl<T> Default for Owned<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for Owned<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&*self.lock()).finish()
    }
}

impl<T: Reclaim> Reclaim for Owned<T> {
    fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
        // The guard is dropped before reclaiming so release code may touch the slot.
        let taken = self.take();
        taken.map_or(Ok(OwnedField::Skip), |value| value.reclaim())
    }
}

impl<T: Release> Release for Owned<T> {
    fn release(&self) -> Result<(), ReleaseError> {
        let taken = self.take();
        taken.map_or(Ok(()), |value| value.release())
    }

    fn holds_resource(&self) -> bool {
        self.with(Release::holds_resource).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counted(AtomicUsize);

    impl Release for Counted {
        fn release(&self) -> Result<(), ReleaseError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_slot_accessors() {
        let slot = Owned::new(5_u32);
        assert!(slot.is_present());
        assert_eq!(slot.get(), Some(5));
        slot.with_mut(|v| *v += 1);
        assert_eq!(slot.with(|v| *v * 2), Some(12));
        assert_eq!(slot.replace(1), Some(6));
        assert_eq!(slot.take(), Some(1));
        assert!(!slot.is_present());
        assert_eq!(Owned::<u32>::default().into_inner(), None);
    }

    #[test]
    fn test_reclaim_clears_the_slot() {
        let resource = Arc::new(Counted::default());
        let slot = Owned::new(Arc::clone(&resource));

        assert_eq!(slot.reclaim().unwrap(), OwnedField::SingleResource);
        assert!(!slot.is_present());
        assert_eq!(Arc::strong_count(&resource), 1);
        assert_eq!(slot.reclaim().unwrap(), OwnedField::Skip);
        assert_eq!(resource.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_plain_release_type_is_taken() {
        let slot = Owned::new(Counted::default());
        assert!(slot.holds_resource());
        slot.release().unwrap();
        assert!(!slot.holds_resource());
        slot.release().unwrap();
    }
}
