use warden::{
    AtomicCell, Cascade, Lifecycle, Owned, OwnedState, TimedRwLock, WeakObserverRegistry,
};

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}

#[derive(OwnedState)]
struct Empty;

#[test]
fn atomic_cells_are_send_and_sync() {
    assert_send::<AtomicCell<bool>>();
    assert_sync::<AtomicCell<bool>>();
    assert_send::<AtomicCell<std::time::SystemTime>>();
    assert_sync::<AtomicCell<std::time::Duration>>();
}

#[test]
fn lock_and_registry_can_be_shared() {
    assert_send::<TimedRwLock>();
    assert_sync::<TimedRwLock>();
    assert_send::<WeakObserverRegistry<u32>>();
    assert_sync::<WeakObserverRegistry<u32>>();
    assert_sync::<Lifecycle>();
}

#[test]
fn cascade_send_sync_follows_state_bounds() {
    assert_send::<Cascade<Empty>>();
    assert_sync::<Cascade<Empty>>();
    // `Owned` is a mutex slot, so it is Sync whenever its value is Send.
    assert_sync::<Owned<std::cell::Cell<u8>>>();
}
