//! End-to-end coordination scenarios, run against the in-process backend so
//! no live Redis is needed. The lock-path behavior under test is identical
//! for both backends: the same acquire/backoff/compare-and-delete loop runs
//! over the shared capability trait.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use coordination::{Coordinator, LockNamespacePolicy, LockOptions};
use serde_json::{json, Map};

fn contended_opts() -> LockOptions {
    LockOptions {
        ttl: Duration::from_secs(5),
        timeout: Duration::from_secs(10),
        retry_delay: Duration::from_millis(2),
    }
}

/// Many threads fight over one lock name; their critical sections must never
/// overlap.
#[test]
fn concurrent_acquisitions_are_mutually_exclusive() {
    let coordinator = Arc::new(Coordinator::standalone());
    let sections: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let sections = Arc::clone(&sections);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let locks = coordinator.locks();
                let guard = locks.acquire("shared-resource", &contended_opts());
                assert!(guard.is_held(), "timeout budget should be generous enough");
                let enter = Instant::now();
                thread::sleep(Duration::from_millis(10));
                let exit = Instant::now();
                sections.lock().unwrap().push((enter, exit));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut sections = sections.lock().unwrap().clone();
    sections.sort_by_key(|(enter, _)| *enter);
    assert_eq!(sections.len(), 8);
    for pair in sections.windows(2) {
        assert!(
            pair[1].0 >= pair[0].1,
            "critical sections overlapped: {:?} vs {:?}",
            pair[0],
            pair[1]
        );
    }
}

/// Two writers race for the same file lock; the loser enters only after the
/// winner leaves, and the final cursor reflects whoever wrote last.
#[test]
fn writers_serialize_and_cursor_reflects_last_writer() {
    let coordinator = Arc::new(Coordinator::standalone());
    let path = "/data/indices/overview.csv";
    let sections: Arc<Mutex<Vec<(u64, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [100u64, 200u64]
        .into_iter()
        .map(|position| {
            let coordinator = Arc::clone(&coordinator);
            let sections = Arc::clone(&sections);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let fc = coordinator.file_coordinator();
                fc.with_write_lock(path, Duration::from_secs(10), |guard| {
                    assert!(guard.is_held());
                    let enter = Instant::now();
                    thread::sleep(Duration::from_millis(30));
                    assert!(fc.update_cursor(path, position, "sum"));
                    sections.lock().unwrap().push((position, enter, Instant::now()));
                });
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut sections = sections.lock().unwrap().clone();
    sections.sort_by_key(|(_, enter, _)| *enter);
    assert_eq!(sections.len(), 2);
    assert!(
        sections[1].1 >= sections[0].2,
        "second writer entered before the first released"
    );

    let last_position = sections.iter().max_by_key(|(_, _, exit)| *exit).unwrap().0;
    assert_eq!(
        coordinator.file_coordinator().cursor_position(path),
        last_position
    );
}

/// Standalone mode still excludes within the process and says so.
#[test]
fn standalone_mode_is_degraded_but_still_excludes() {
    let coordinator = Coordinator::standalone();
    assert!(coordinator.is_degraded());
    assert!(coordinator.snapshot().fallback_mode);

    let locks = coordinator.locks();
    let holder = locks.acquire("fallback-check", &contended_opts());
    assert!(holder.is_held());

    let contender = locks.acquire(
        "fallback-check",
        &LockOptions {
            ttl: Duration::from_secs(5),
            timeout: Duration::from_millis(60),
            retry_delay: Duration::from_millis(5),
        },
    );
    assert!(!contender.is_held());
}

/// A full service cycle: publish health, share cache state, advance a cursor
/// through coordinated file appends, then clean up.
#[test]
fn service_lifecycle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ticks.csv");
    let path = path.to_str().unwrap();

    let coordinator = Coordinator::standalone();
    let fc = coordinator.file_coordinator();

    let mut fields = Map::new();
    fields.insert("status".to_string(), json!("running"));
    fields.insert("pid".to_string(), json!(4242));
    assert!(coordinator.health().publish("tick-writer", fields, None));

    fc.write_string(path, "ts,index,last_price\n").unwrap();
    fc.append_string(path, "2025-08-24 14:30:00,NIFTY,100.50\n")
        .unwrap();
    let content = fc.read_to_string(path).unwrap();
    assert!(fc.update_cursor(path, content.len() as u64, "sum"));
    assert_eq!(fc.cursor_position(path), content.len() as u64);

    let cache = coordinator.cache();
    assert!(cache.set(
        "latest_tick",
        &json!({"index": "NIFTY", "last_price": 100.5}),
        Duration::from_secs(30),
    ));
    assert_eq!(
        cache.get("latest_tick"),
        Some(json!({"index": "NIFTY", "last_price": 100.5}))
    );

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.active_services, vec!["tick-writer"]);
    assert_eq!(snapshot.active_cursors, 1);

    assert!(coordinator.cursors().clear(path));
    assert_eq!(coordinator.snapshot().active_cursors, 0);
}

/// The split/unified namespace policy decides whether a reader can overlap a
/// writer on the same path.
#[test]
fn namespace_policy_controls_reader_writer_overlap() {
    let coordinator = Coordinator::standalone();
    let path = "/data/participants/flows.csv";

    let split = coordinator.file_coordinator_with_policy(LockNamespacePolicy::Split);
    split.with_write_lock(path, Duration::from_secs(1), |write| {
        assert!(write.is_held());
        split.with_read_lock(path, Duration::from_millis(50), |read| {
            assert!(read.is_held());
        });
    });

    let unified = coordinator.file_coordinator_with_policy(LockNamespacePolicy::Unified);
    unified.with_write_lock(path, Duration::from_secs(1), |write| {
        assert!(write.is_held());
        unified.with_read_lock(path, Duration::from_millis(50), |read| {
            assert!(!read.is_held());
        });
    });
}
