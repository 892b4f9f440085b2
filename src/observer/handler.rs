use core::any::Any;
use core::fmt;
use std::sync::{Arc, Weak};

/// A subscriber that owns no instance and is therefore always alive.
pub type StaticMethod<A> = fn(&dyn Any, &A);

type Thunk<A> = Box<dyn Fn(&(dyn Any + Send + Sync), &dyn Any, &A) + Send + Sync>;

/// Deduplication key of a registered handler: (owner address, method address).
///
/// Function addresses are not guaranteed unique: the same method may get
/// different addresses in different codegen units or crates, and distinct
/// functions with identical bodies may be merged. Rebuilding a [`Handler`]
/// for [`remove`](super::WeakObserverRegistry::remove) can therefore miss.
/// Keep the identity taken at registration and pass it to
/// [`remove_identity`](super::WeakObserverRegistry::remove_identity) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerIdentity {
    owner: Option<usize>,
    method: usize,
}

/// One registered subscriber.
pub(super) enum ObserverEntry<A> {
    Static {
        method: StaticMethod<A>,
    },
    Instance {
        owner: Weak<dyn Any + Send + Sync>,
        method: usize,
        thunk: Thunk<A>,
    },
}

pub(super) enum Dispatch {
    Delivered,
    Dead,
}

impl<A> ObserverEntry<A> {
    pub(super) fn identity(&self) -> HandlerIdentity {
        match self {
            Self::Static { method } => HandlerIdentity {
                owner: None,
                method: *method as usize,
            },
            Self::Instance { owner, method, .. } => HandlerIdentity {
                owner: Some(Weak::as_ptr(owner).cast::<()>() as usize),
                method: *method,
            },
        }
    }

    pub(super) fn is_alive(&self) -> bool {
        match self {
            Self::Static { .. } => true,
            Self::Instance { owner, .. } => owner.strong_count() > 0,
        }
    }

    pub(super) fn dispatch(&self, sender: &dyn Any, args: &A) -> Dispatch {
        match self {
            Self::Static { method } => {
                method(sender, args);
                Dispatch::Delivered
            }
            Self::Instance { owner, thunk, .. } => match owner.upgrade() {
                Some(owner) => {
                    thunk(&*owner, sender, args);
                    Dispatch::Delivered
                }
                None => Dispatch::Dead,
            },
        }
    }
}

/// A subscription request for a [`WeakObserverRegistry`](super::WeakObserverRegistry).
///
/// Instance handlers hold their owner weakly; the registry never keeps a
/// subscriber alive.
pub struct Handler<A> {
    pub(super) entry: ObserverEntry<A>,
}

impl<A: 'static> Handler<A> {
    /// A free function or associated function with no receiver.
    pub fn from_fn(method: StaticMethod<A>) -> Self {
        Self {
            entry: ObserverEntry::Static { method },
        }
    }

    /// A method on `owner`, invoked only while `owner` is alive.
    pub fn from_method<O>(owner: &Arc<O>, method: fn(&O, &dyn Any, &A)) -> Self
    where
        O: Send + Sync + 'static,
    {
        let weak: Weak<O> = Arc::downgrade(owner);
        Self {
            entry: ObserverEntry::Instance {
                owner: weak,
                method: method as usize,
                thunk: Box::new(move |owner: &(dyn Any + Send + Sync), sender: &dyn Any, args: &A| {
                    if let Some(owner) = owner.downcast_ref::<O>() {
                        method(owner, sender, args);
                    }
                }),
            },
        }
    }

    /// A closure whose own allocation is the weakly held owner.
    ///
    /// The subscription lives exactly as long as the caller keeps `closure` alive.
    pub fn from_closure<F>(closure: &Arc<F>) -> Self
    where
        F: Fn(&dyn Any, &A) + Send + Sync + 'static,
    {
        let weak: Weak<F> = Arc::downgrade(closure);
        Self {
            entry: ObserverEntry::Instance {
                owner: weak,
                method: 0,
                thunk: Box::new(|owner: &(dyn Any + Send + Sync), sender: &dyn Any, args: &A| {
                    if let Some(closure) = owner.downcast_ref::<F>() {
                        closure(sender, args);
                    }
                }),
            },
        }
    }

    /// The deduplication key of this handler.
    pub fn identity(&self) -> HandlerIdentity {
        self.entry.identity()
    }
}

impl<A> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.entry {
            ObserverEntry::Static { .. } => "static",
            ObserverEntry::Instance { .. } => "instance",
        };
        f.debug_struct("Handler")
            .field("kind", &kind)
            .field("identity", &self.entry.identity())
            .finish()
    }
}
