use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use warden::{Handler, WeakObserverRegistry};

#[derive(Default)]
struct Subscriber {
    calls: AtomicUsize,
}

impl Subscriber {
    fn on_tick(&self, _sender: &dyn Any, step: &usize) {
        self.calls.fetch_add(*step, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[test]
fn add_none_registers_nothing() {
    let registry = WeakObserverRegistry::<usize>::new();
    assert!(!registry.add(None));
    assert_eq!(registry.len(), 0);
}

#[test]
fn duplicate_instance_handler_is_rejected() {
    let registry = WeakObserverRegistry::new();
    let subscriber = Arc::new(Subscriber::default());
    assert!(registry.add(Handler::from_method(&subscriber, Subscriber::on_tick)));
    assert!(!registry.add(Handler::from_method(&subscriber, Subscriber::on_tick)));

    registry.invoke(&(), &1);
    assert_eq!(subscriber.calls(), 1);
}

#[test]
fn collected_subscriber_is_not_called() {
    let registry = WeakObserverRegistry::new();
    let survivors: Vec<_> = (0..3).map(|_| Arc::new(Subscriber::default())).collect();
    for subscriber in &survivors {
        registry.add(Handler::from_method(subscriber, Subscriber::on_tick));
    }

    let doomed = Arc::new(Subscriber::default());
    registry.add(Handler::from_method(&doomed, Subscriber::on_tick));
    let witness = Arc::downgrade(&doomed);
    drop(doomed);
    assert!(witness.upgrade().is_none());

    registry.invoke(&(), &1);
    assert!(survivors.iter().all(|s| s.calls() == 1));
    assert_eq!(registry.len(), survivors.len());
    assert_eq!(registry.live_count(), survivors.len());
}

#[test]
fn registry_does_not_keep_subscribers_alive() {
    let registry = WeakObserverRegistry::<usize>::new();
    let subscriber = Arc::new(Subscriber::default());
    registry.add(Handler::from_method(&subscriber, Subscriber::on_tick));
    assert_eq!(Arc::strong_count(&subscriber), 1);
}

#[test]
fn handlers_may_reenter_the_registry() {
    let registry = Arc::new(WeakObserverRegistry::<usize>::new());
    let inner = Arc::new(Subscriber::default());

    let weak_registry = Arc::downgrade(&registry);
    let late = Arc::clone(&inner);
    let subscribe_late = Arc::new(move |_: &dyn Any, _: &usize| {
        if let Some(registry) = weak_registry.upgrade() {
            registry.add(Handler::from_method(&late, Subscriber::on_tick));
        }
    });
    registry.add(Handler::from_closure(&subscribe_late));

    // The snapshot taken by the first invoke does not include the late handler.
    registry.invoke(&(), &1);
    assert_eq!(inner.calls(), 0);
    registry.invoke(&(), &1);
    assert_eq!(inner.calls(), 1);
}

#[test]
fn concurrent_add_and_invoke() {
    const THREADS: usize = 8;
    let registry = WeakObserverRegistry::new();
    let subscribers: Vec<_> = (0..THREADS).map(|_| Arc::new(Subscriber::default())).collect();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for subscriber in &subscribers {
            let registry = &registry;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                assert!(registry.add(Handler::from_method(subscriber, Subscriber::on_tick)));
                for _ in 0..100 {
                    registry.invoke(&(), &0);
                }
            });
        }
    });

    assert_eq!(registry.len(), THREADS);
    registry.invoke(&(), &1);
    assert!(subscribers.iter().all(|s| s.calls() == 1));
}
