//! Wait queue ordering and cleanup of abandoned waiters.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use remote_lock::{
    InMemoryAdapter, InMemoryStore, LockError, LockOptionsOverride, RemoteLock, StoreAdapter,
};

use crate::support::{init_tracing, new_lock, quick, wait_until, LOCK_KEY};

const QUEUE_KEY: &str = "lock|lock_key|queue";

#[test]
fn grants_locks_in_the_order_they_were_requested() {
    let (store, holder) = new_lock();
    holder.acquire_lock(LOCK_KEY, &LockOptionsOverride::new()).unwrap();

    let output = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for waiter_no in 1..=3 {
        let waiter = holder.fork();
        let output = Arc::clone(&output);
        handles.push(thread::spawn(move || {
            waiter.synchronize(LOCK_KEY, &quick().retries(5_000), || {
                output.lock().unwrap().push(waiter_no);
                thread::sleep(Duration::from_millis(10));
                Ok::<_, LockError>(())
            })
        }));

        // don't start the next waiter until this one is in line
        assert!(wait_until(Duration::from_secs(2), || {
            store.list(QUEUE_KEY).unwrap().len() == waiter_no
        }));
    }

    holder.release_lock(LOCK_KEY).unwrap();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(*output.lock().unwrap(), vec![1, 2, 3]);
    assert!(store.list(QUEUE_KEY).unwrap().is_empty());
}

#[test]
fn cleans_up_waiters_who_queued_but_disconnected() {
    init_tracing();
    let store = InMemoryStore::new();
    let heartbeat = Duration::from_millis(150);
    let adapter = InMemoryAdapter::new(store.clone()).with_heartbeat_ttl(heartbeat);
    let first = RemoteLock::new(adapter).unwrap();
    let second = first.fork();
    let third = first.fork();
    let output = Arc::new(Mutex::new(Vec::new()));

    // 1: takes the lock and sits on it for a while
    let (held_tx, held_rx) = mpsc::channel();
    let first_output = Arc::clone(&output);
    let first_handle = thread::spawn(move || {
        first.synchronize(LOCK_KEY, &LockOptionsOverride::new(), || {
            first_output.lock().unwrap().push(1);
            held_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(600));
            Ok::<_, LockError>(())
        })
    });
    held_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("first waiter never took the lock");

    // 2: gives up after one retry, leaving its queue slot behind
    let result = second.synchronize(LOCK_KEY, &quick().retries(1), || {
        output.lock().unwrap().push(3);
        Ok::<_, LockError>(())
    });
    assert!(matches!(result, Err(LockError::AcquisitionFailed { .. })));
    assert_eq!(
        store.list(QUEUE_KEY).unwrap(),
        vec![second.adapter().identity().to_string()]
    );

    // 3: waits long enough for 2's heartbeat to lapse, reaps it, then gets the lock
    let third_output = Arc::clone(&output);
    let third_handle = thread::spawn(move || {
        let options = LockOptionsOverride::new()
            .initial_wait(0.05)
            .jitter(0.0)
            .retries(60);
        third.synchronize(LOCK_KEY, &options, || {
            third_output.lock().unwrap().push(2);
            Ok::<_, LockError>(())
        })
    });

    first_handle.join().unwrap().unwrap();
    third_handle.join().unwrap().unwrap();

    let mut recorded = output.lock().unwrap().clone();
    recorded.sort();
    assert_eq!(recorded, vec![1, 2]);
    assert!(store.list(QUEUE_KEY).unwrap().is_empty());
    let heartbeat = second.adapter().heartbeat_key(second.adapter().identity());
    assert!(!store.exists(&heartbeat).unwrap());
}

#[test]
fn live_head_is_not_reaped() {
    let (store, holder) = new_lock();
    holder.acquire_lock(LOCK_KEY, &LockOptionsOverride::new()).unwrap();

    // a patient waiter keeps renewing its heartbeat at the head
    let patient = holder.fork();
    let patient_id = patient.adapter().identity().to_string();
    let patient_handle = thread::spawn(move || {
        patient
            .acquire_lock(LOCK_KEY, &quick().retries(5_000))
            .map(|_| patient)
    });
    assert!(wait_until(Duration::from_secs(2), || {
        store.list(QUEUE_KEY).unwrap().len() == 1
    }));

    // a second waiter polls for well past the heartbeat TTL without displacing it
    let impatient = holder.fork();
    let result = impatient.acquire_lock(
        LOCK_KEY,
        &LockOptionsOverride::new().initial_wait(0.1).jitter(0.0).retries(15),
    );
    assert!(matches!(result, Err(LockError::AcquisitionFailed { .. })));
    assert_eq!(store.list(QUEUE_KEY).unwrap().first(), Some(&patient_id));

    holder.release_lock(LOCK_KEY).unwrap();
    let patient = patient_handle.join().unwrap().unwrap();
    assert!(patient.acquired(LOCK_KEY).unwrap());
}
