//! Lease claim, expiry and recovery against a real database file.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{seg, TestHarness, LEASE};
use lingo::{LeaseState, TranslationStatus};

#[test]
fn concurrent_claims_from_two_connections_have_one_winner() {
    let harness = TestHarness::new();
    let id = harness.store.create("你好。世界。", "text").unwrap().id;

    let stores = [harness.store.clone(), harness.second_store()];
    let barrier = Arc::new(Barrier::new(stores.len()));
    let handles: Vec<_> = stores
        .into_iter()
        .map(|store| {
            let barrier = barrier.clone();
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                store.claim_translation_job(&id, LEASE).unwrap()
            })
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);

    let lease = harness.store.job_lease(&id).unwrap();
    assert_eq!(lease.state, LeaseState::Leased);
    assert_eq!(lease.attempts, 1);
}

#[test]
fn crashed_worker_lease_expires_and_job_is_reclaimed() {
    let harness = TestHarness::new();
    let other = harness.second_store();
    let id = harness.store.create("第一句。第二句。", "text").unwrap().id;

    assert!(harness.store.claim_translation_job(&id, LEASE).unwrap());
    harness.store.set_processing(&id, 2, &[]).unwrap();
    harness.store.add_progress_segment(&id, &seg("第一句。"), 0).unwrap();
    // The worker stops here without completing or failing.

    assert!(!other.list_restartable_translation_ids().unwrap().contains(&id));
    assert!(!other.claim_translation_job(&id, LEASE).unwrap());

    harness.clock.advance(chrono::Duration::seconds(31));

    assert_eq!(other.list_restartable_translation_ids().unwrap(), vec![id.clone()]);
    assert!(other.claim_translation_job(&id, LEASE).unwrap());
    assert_eq!(other.job_lease(&id).unwrap().attempts, 2);

    // Partial progress survives the handover.
    let snapshot = other.progress_snapshot(&id).unwrap();
    assert_eq!(snapshot.current, 1);
    assert_eq!(snapshot.results.len(), 1);
}

#[test]
fn three_sentence_job_discovers_total_and_completes() {
    let harness = TestHarness::new();
    let store = &harness.store;
    let id = store.create("A. B. C.", "text").unwrap().id;

    assert!(store.claim_translation_job(&id, LEASE).unwrap());
    let mut counters = Vec::new();
    for (pidx, text) in ["A.", "B.", "C."].iter().enumerate() {
        counters.push(store.add_progress_segment(&id, &seg(text), pidx).unwrap());
    }
    assert_eq!(counters, vec![(1, 1), (2, 2), (3, 3)]);

    store.complete(&id).unwrap();

    let done = store.get(&id).unwrap();
    assert_eq!(done.status, TranslationStatus::Completed);
    assert_eq!(done.progress, 3);
    assert_eq!(done.total, 3);
    assert_eq!(
        done.full_translation.as_deref(),
        Some("EN(A.) EN(B.) EN(C.)")
    );
    assert_eq!(done.paragraphs.len(), 3);

    assert!(!store.claim_translation_job(&id, LEASE).unwrap());
    assert!(!store.list_restartable_translation_ids().unwrap().contains(&id));
}

#[test]
fn failed_job_is_never_restartable() {
    let harness = TestHarness::new();
    let store = &harness.store;
    let id = store.create("坏。", "text").unwrap().id;

    assert!(store.claim_translation_job(&id, LEASE).unwrap());
    store.fail(&id, "Failed to translate segments").unwrap();
    harness.clock.advance(chrono::Duration::minutes(5));

    assert!(store.list_restartable_translation_ids().unwrap().is_empty());
    assert!(!store.claim_translation_job(&id, LEASE).unwrap());
    let lease = store.job_lease(&id).unwrap();
    assert_eq!(lease.state, LeaseState::Failed);
    assert_eq!(lease.last_error.as_deref(), Some("Failed to translate segments"));
}
