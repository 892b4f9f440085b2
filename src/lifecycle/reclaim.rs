use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use super::Release;
use crate::error::ReleaseError;

/// How the cascade classified one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnedField {
    /// Absent, empty, or not resource-bearing. Nothing was released.
    Skip,
    /// A single resource was released.
    SingleResource,
    /// Every element of a collection was released.
    ResourceSequence,
    /// The values and then the keys of a mapping were released.
    ResourceKeyedContainer,
}

/// A field shape the cascade knows how to release and classify.
///
/// Implemented for `Arc`/`Box` of a [`Release`] type, for `Option` of any
/// `Reclaim` shape, for sequences of [`Release`] elements and for maps whose
/// keys or values are resource-bearing [`Side`]s.
pub trait Reclaim {
    /// Releases whatever the field holds and reports its classification.
    ///
    /// # Errors
    /// The first non-tolerated failure. Remaining elements are still released.
    fn reclaim(&self) -> Result<OwnedField, ReleaseError>;
}

/// Maps the tolerated concurrent-release race to success.
pub(crate) fn tolerate(result: Result<(), ReleaseError>) -> Result<(), ReleaseError> {
    match result {
        Err(ReleaseError::AlreadyGone) => Ok(()),
        other => other,
    }
}

/// Keeps the first error, lets the rest go.
pub(crate) fn keep_first(first: &mut Option<ReleaseError>, result: Result<(), ReleaseError>) {
    if let Err(err) = result {
        first.get_or_insert(err);
    }
}

fn release_each<'a, E>(items: impl IntoIterator<Item = &'a E>) -> Result<(), ReleaseError>
where
    E: Release + 'a,
{
    let mut first = None;
    for item in items {
        keep_first(&mut first, tolerate(item.release()));
    }
    first.map_or(Ok(()), Err)
}

impl<R: Release + ?Sized> Reclaim for Arc<R> {
    fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
        if !self.holds_resource() {
            return Ok(OwnedField::Skip);
        }
        tolerate(self.release()).map(|()| OwnedField::SingleResource)
    }
}

impl<R: Release + ?Sized> Reclaim for Box<R> {
    fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
        if !self.holds_resource() {
            return Ok(OwnedField::Skip);
        }
        tolerate(self.release()).map(|()| OwnedField::SingleResource)
    }
}

impl<T: Reclaim> Reclaim for Option<T> {
    fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
        match self {
            Some(inner) => inner.reclaim(),
            None => Ok(OwnedField::Skip),
        }
    }
}

macro_rules! sequence_reclaim {
    ($($seq:ty => [$($generics:tt)*]),* $(,)?) => {$(
        impl<$($generics)*> Reclaim for $seq {
            fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
                if self.is_empty() {
                    return Ok(OwnedField::Skip);
                }
                release_each(self).map(|()| OwnedField::ResourceSequence)
            }
        }

        impl<$($generics)*> Side for $seq {
            const BEARING: bool = true;

            fn reclaim_side(&self) -> Result<(), ReleaseError> {
                release_each(self)
            }
        }
    )*};
}

sequence_reclaim! {
    Vec<E> => [E: Release],
    VecDeque<E> => [E: Release],
    [E; N] => [E: Release, const N: usize],
    HashSet<E, S> => [E: Release, S],
    BTreeSet<E> => [E: Release],
}

/// What releasing one key or value produced: `None` for an inert side,
/// `Some(result)` for a resource-bearing one.
pub type SideOutcome = Option<Result<(), ReleaseError>>;

/// One side (keys or values) of a mapping, as seen by the cascade.
///
/// A side is resource-bearing when it is a [`Release`] handle or a sequence of
/// them. Maps are never resource-bearing sides: nesting is inspected one
/// level deep only.
///
/// Derived cascades do not need this trait for their map fields. Each side
/// is classified on its own there, and a key or value type that is neither
/// `Side` nor [`Release`] is inert. `Side` decides only when a map sits
/// behind another shape, such as `Option<HashMap<..>>` or `Owned<BTreeMap<..>>`,
/// and lets [`inert_side!`](crate::inert_side) opt a [`Release`] type out.
pub trait Side {
    /// `true` if values of this type may hold resources.
    const BEARING: bool;

    /// Releases this key or value.
    ///
    /// # Errors
    /// The first non-tolerated failure.
    fn reclaim_side(&self) -> Result<(), ReleaseError>;

    /// Releases this key or value if the type is resource-bearing.
    fn side_outcome(&self) -> SideOutcome {
        Self::BEARING.then(|| self.reclaim_side())
    }
}

impl<R: Release + ?Sized> Side for Arc<R> {
    const BEARING: bool = true;

    fn reclaim_side(&self) -> Result<(), ReleaseError> {
        tolerate(self.release())
    }
}

impl<R: Release + ?Sized> Side for Box<R> {
    const BEARING: bool = true;

    fn reclaim_side(&self) -> Result<(), ReleaseError> {
        tolerate(self.release())
    }
}

impl<T: Side> Side for Option<T> {
    const BEARING: bool = T::BEARING;

    fn reclaim_side(&self) -> Result<(), ReleaseError> {
        self.as_ref().map_or(Ok(()), Side::reclaim_side)
    }
}

/// Declares types as inert map sides: never released by the cascade.
#[macro_export]
macro_rules! inert_side {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::lifecycle::Side for $ty {
            const BEARING: bool = false;

            fn reclaim_side(&self) -> ::core::result::Result<(), $crate::ReleaseError> {
                Ok(())
            }
        }
    )*};
}

inert_side! {
    (), bool, char,
    u8, u16, u32, u64, u128, usize,
    i8, i16, i32, i64, i128, isize,
    f32, f64,
    String, &'static str, PathBuf,
    std::time::Duration, std::time::SystemTime,
}

impl<K, V, S> Side for HashMap<K, V, S> {
    const BEARING: bool = false;

    fn reclaim_side(&self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

impl<K, V> Side for BTreeMap<K, V> {
    const BEARING: bool = false;

    fn reclaim_side(&self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

/// A mapping that exposes its values and keys to the cascade.
///
/// Either view may be unavailable; `None` means "could not be retrieved" and
/// that side is skipped without error. A derived cascade picks up any field
/// whose type implements this trait.
pub trait KeyedContainer {
    /// Key type.
    type Key;
    /// Value type.
    type Value;

    /// Best-effort view of the values.
    fn values_side(&self) -> Option<Box<dyn Iterator<Item = &Self::Value> + '_>>;

    /// Best-effort view of the keys.
    fn keys_side(&self) -> Option<Box<dyn Iterator<Item = &Self::Key> + '_>>;
}

impl<K, V, S> KeyedContainer for HashMap<K, V, S> {
    type Key = K;
    type Value = V;

    fn values_side(&self) -> Option<Box<dyn Iterator<Item = &V> + '_>> {
        Some(Box::new(self.values()))
    }

    fn keys_side(&self) -> Option<Box<dyn Iterator<Item = &K> + '_>> {
        Some(Box::new(self.keys()))
    }
}

impl<K, V> KeyedContainer for BTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn values_side(&self) -> Option<Box<dyn Iterator<Item = &V> + '_>> {
        Some(Box::new(self.values()))
    }

    fn keys_side(&self) -> Option<Box<dyn Iterator<Item = &K> + '_>> {
        Some(Box::new(self.keys()))
    }
}

impl<C: KeyedContainer> KeyedContainer for Option<C> {
    type Key = C::Key;
    type Value = C::Value;

    fn values_side(&self) -> Option<Box<dyn Iterator<Item = &C::Value> + '_>> {
        self.as_ref()?.values_side()
    }

    fn keys_side(&self) -> Option<Box<dyn Iterator<Item = &C::Key> + '_>> {
        self.as_ref()?.keys_side()
    }
}

/// Releases one side with `classify`, stopping at the first inert element.
fn reclaim_side_with<'a, T, F>(
    side: Option<Box<dyn Iterator<Item = &'a T> + 'a>>,
    mut classify: F,
    bearing: &mut bool,
    first: &mut Option<ReleaseError>,
) where
    T: 'a,
    F: FnMut(&T) -> SideOutcome,
{
    let Some(items) = side else {
        return;
    };
    for item in items {
        match classify(item) {
            Some(result) => {
                *bearing = true;
                keep_first(first, result);
            }
            None => return,
        }
    }
}

/// Releases a mapping's values, then its keys.
///
/// `keys` and `values` classify and release one element each. Sides that are
/// inert, or whose view is unavailable, are skipped. A mapping with no
/// resource-bearing element classifies as [`OwnedField::Skip`].
///
/// # Errors
/// The first non-tolerated failure across both sides.
pub fn reclaim_keyed<C, FK, FV>(
    container: &C,
    keys: FK,
    values: FV,
) -> Result<OwnedField, ReleaseError>
where
    C: KeyedContainer + ?Sized,
    FK: FnMut(&C::Key) -> SideOutcome,
    FV: FnMut(&C::Value) -> SideOutcome,
{
    let mut bearing = false;
    let mut first = None;
    reclaim_side_with(container.values_side(), values, &mut bearing, &mut first);
    reclaim_side_with(container.keys_side(), keys, &mut bearing, &mut first);

    match first {
        Some(err) => Err(err),
        None if bearing => Ok(OwnedField::ResourceKeyedContainer),
        None => Ok(OwnedField::Skip),
    }
}

impl<K: Side, V: Side, S> Reclaim for HashMap<K, V, S> {
    fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
        reclaim_keyed(self, K::side_outcome, V::side_outcome)
    }
}

impl<K: Side, V: Side> Reclaim for BTreeMap<K, V> {
    fn reclaim(&self) -> Result<OwnedField, ReleaseError> {
        reclaim_keyed(self, K::side_outcome, V::side_outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counter {
        releases: AtomicUsize,
    }

    impl Release for Counter {
        fn release(&self) -> Result<(), ReleaseError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Gone;

    impl Release for Gone {
        fn release(&self) -> Result<(), ReleaseError> {
            Err(ReleaseError::AlreadyGone)
        }
    }

    struct Broken;

    impl Release for Broken {
        fn release(&self) -> Result<(), ReleaseError> {
            Err(ReleaseError::failed(anyhow::anyhow!("broken")))
        }
    }

    fn count(counter: &Arc<Counter>) -> usize {
        counter.releases.load(Ordering::SeqCst)
    }

    #[test]
    fn test_sequence_skips_absent_elements() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let items = vec![Some(Arc::clone(&a)), None, Some(Arc::clone(&b))];
        assert_eq!(items.reclaim().unwrap(), OwnedField::ResourceSequence);
        assert_eq!((count(&a), count(&b)), (1, 1));

        let empty: Vec<Arc<Counter>> = Vec::new();
        assert_eq!(empty.reclaim().unwrap(), OwnedField::Skip);
    }

    #[test]
    fn test_already_gone_does_not_stop_the_sequence() {
        let tail = Arc::new(Counter::default());
        let items: Vec<Arc<dyn Release + Send + Sync>> = vec![Arc::new(Gone), tail.clone()];
        assert_eq!(items.reclaim().unwrap(), OwnedField::ResourceSequence);
        assert_eq!(count(&tail), 1);
    }

    #[test]
    fn test_failure_surfaces_after_remaining_elements() {
        let tail = Arc::new(Counter::default());
        let items: Vec<Arc<dyn Release + Send + Sync>> = vec![Arc::new(Broken), tail.clone()];
        let err = items.reclaim().unwrap_err();
        assert!(!err.is_already_gone());
        assert_eq!(count(&tail), 1);
    }

    #[test]
    fn test_map_releases_values_before_keys() {
        struct Ordered {
            label: &'static str,
            log: Arc<Mutex<Vec<&'static str>>>,
        }

        impl Release for Ordered {
            fn release(&self) -> Result<(), ReleaseError> {
                self.log.lock().unwrap().push(self.label);
                Ok(())
            }
        }

        impl PartialEq for Ordered {
            fn eq(&self, other: &Self) -> bool {
                self.label == other.label
            }
        }

        impl Eq for Ordered {}

        impl PartialOrd for Ordered {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for Ordered {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.label.cmp(other.label)
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut map = BTreeMap::new();
        map.insert(
            Arc::new(Ordered { label: "key", log: log.clone() }),
            Arc::new(Ordered { label: "value", log: log.clone() }),
        );

        assert_eq!(map.reclaim().unwrap(), OwnedField::ResourceKeyedContainer);
        assert_eq!(*log.lock().unwrap(), vec!["value", "key"]);
    }

    #[test]
    fn test_inert_and_nested_maps_are_skipped() {
        let mut plain = HashMap::new();
        plain.insert(String::from("a"), String::from("b"));
        assert_eq!(plain.reclaim().unwrap(), OwnedField::Skip);

        let counter = Arc::new(Counter::default());
        let mut inner = HashMap::new();
        inner.insert(1_u32, Arc::clone(&counter));
        let mut outer = HashMap::new();
        outer.insert(String::from("inner"), inner);
        assert_eq!(outer.reclaim().unwrap(), OwnedField::Skip);
        assert_eq!(count(&counter), 0);
    }

    #[test]
    fn test_map_of_sequences_releases_every_element() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let mut map = HashMap::new();
        map.insert(7_u8, vec![Arc::clone(&a), Arc::clone(&b)]);
        assert_eq!(map.reclaim().unwrap(), OwnedField::ResourceKeyedContainer);
        assert_eq!((count(&a), count(&b)), (1, 1));
    }

    #[test]
    fn test_unavailable_view_is_skipped_silently() {
        struct Opaque(Vec<Arc<Counter>>);

        impl KeyedContainer for Opaque {
            type Key = u32;
            type Value = Arc<Counter>;

            fn values_side(&self) -> Option<Box<dyn Iterator<Item = &Arc<Counter>> + '_>> {
                Some(Box::new(self.0.iter()))
            }

            fn keys_side(&self) -> Option<Box<dyn Iterator<Item = &u32> + '_>> {
                None
            }
        }

        let counter = Arc::new(Counter::default());
        let container = Opaque(vec![Arc::clone(&counter)]);
        assert_eq!(
            reclaim_keyed(&container, u32::side_outcome, Arc::<Counter>::side_outcome).unwrap(),
            OwnedField::ResourceKeyedContainer
        );
        assert_eq!(count(&counter), 1);
    }
}
