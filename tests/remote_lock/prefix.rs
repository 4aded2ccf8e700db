//! Key naming and prefixing.

use remote_lock::{
    InMemoryAdapter, InMemoryStore, LockError, LockOptionsOverride, RemoteLock, StoreAdapter,
};

use crate::support::{init_tracing, new_lock, quick, LOCK_KEY};

#[test]
fn prefixes_the_key_name_when_a_prefix_is_set() {
    init_tracing();
    let store = InMemoryStore::new();
    let lock =
        RemoteLock::with_prefix(InMemoryAdapter::new(store.clone()), "staging_server").unwrap();

    lock.acquire_lock(LOCK_KEY, &LockOptionsOverride::new()).unwrap();

    assert_eq!(
        store.get("staging_server|lock|lock_key").unwrap(),
        Some(lock.adapter().identity().to_string())
    );
    assert!(!store.exists("lock|lock_key").unwrap());
}

#[test]
fn different_prefixes_never_contend() {
    init_tracing();
    let store = InMemoryStore::new();
    let staging = RemoteLock::with_prefix(InMemoryAdapter::new(store.clone()), "staging").unwrap();
    let production =
        RemoteLock::with_prefix(InMemoryAdapter::new(store.clone()), "production").unwrap();
    let unprefixed = RemoteLock::new(InMemoryAdapter::new(store)).unwrap();

    staging.acquire_lock(LOCK_KEY, &quick().retries(0)).unwrap();
    production.acquire_lock(LOCK_KEY, &quick().retries(0)).unwrap();
    unprefixed.acquire_lock(LOCK_KEY, &quick().retries(0)).unwrap();

    assert!(staging.acquired(LOCK_KEY).unwrap());
    assert!(production.acquired(LOCK_KEY).unwrap());
    assert!(unprefixed.acquired(LOCK_KEY).unwrap());

    staging.release_lock(LOCK_KEY).unwrap();
    assert!(production.acquired(LOCK_KEY).unwrap());
}

#[test]
fn forks_keep_the_prefix() {
    let lock =
        RemoteLock::with_prefix(InMemoryAdapter::new(InMemoryStore::new()), "tenant-a").unwrap();
    let forked = lock.fork();

    assert_eq!(forked.prefix(), Some("tenant-a"));
    assert_ne!(forked.adapter().identity(), lock.adapter().identity());

    lock.acquire_lock(LOCK_KEY, &LockOptionsOverride::new()).unwrap();
    assert!(forked
        .acquire_lock(LOCK_KEY, &quick().retries(1))
        .is_err());
}

// ============================================================================
// Separator in names
// ============================================================================

#[test]
fn a_lock_named_after_a_queue_is_refused_once_that_queue_exists() {
    init_tracing();
    let (store, holder) = new_lock();
    let waiter = holder.fork();
    let other = holder.fork();

    holder.acquire_lock("foo", &LockOptionsOverride::new()).unwrap();
    assert!(waiter.acquire_lock("foo", &quick().retries(1)).is_err());
    assert_eq!(
        store.list("lock|foo|queue").unwrap(),
        vec![waiter.adapter().identity().to_string()]
    );

    let result = other.acquire_lock("foo|queue", &LockOptionsOverride::new());
    assert!(matches!(result, Err(LockError::InvalidKey(_))), "{:?}", result);
    assert!(matches!(
        other.acquired("foo|queue"),
        Err(LockError::InvalidKey(_))
    ));
}

#[test]
fn contention_is_unaffected_by_attempts_to_hold_a_queue_name() {
    init_tracing();
    let (store, holder) = new_lock();
    let squatter = holder.fork();
    let waiter = holder.fork();

    assert!(matches!(
        squatter.acquire_lock("bar|queue", &LockOptionsOverride::new()),
        Err(LockError::InvalidKey(_))
    ));
    assert_eq!(store.get("lock|bar|queue").unwrap(), None);

    holder.acquire_lock("bar", &LockOptionsOverride::new()).unwrap();
    let result = waiter.acquire_lock("bar", &quick().retries(1));
    assert!(
        matches!(result, Err(LockError::AcquisitionFailed { .. })),
        "{:?}",
        result
    );
}

#[test]
fn prefixes_are_single_segments() {
    for prefix in ["staging|server", "lock"] {
        let result = RemoteLock::with_prefix(InMemoryAdapter::new(InMemoryStore::new()), prefix);
        assert!(matches!(result, Err(LockError::InvalidKey(_))), "{}", prefix);
    }
}
