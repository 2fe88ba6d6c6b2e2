// tests/leader_election.rs
use std::time::Duration;

use news_relay::error::RelayError;
use news_relay::leader::{FileLeaseStore, LeaderElector, LeaderLease, LeaseState, LeaseStore, MemoryLeaseStore};

const STALE: Duration = Duration::from_secs(300);

fn pair() -> (MemoryLeaseStore, LeaderElector, LeaderElector) {
    let store = MemoryLeaseStore::new();
    let a = LeaderElector::new(Box::new(store.clone()), "runner-a", STALE);
    let b = LeaderElector::new(Box::new(store.clone()), "runner-b", STALE);
    (store, a, b)
}

#[test]
fn only_one_runner_leads() {
    let (store, mut a, mut b) = pair();
    a.try_acquire(1_000).unwrap();
    assert!(a.is_leader());

    match b.try_acquire(1_100) {
        Err(RelayError::LeaseConflict { holder, age_secs }) => {
            assert_eq!(holder, "runner-a");
            assert_eq!(age_secs, 100);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(b.state(), LeaseState::Contending);
    assert_eq!(store.read().unwrap(), Some(LeaderLease::new("runner-a", 1_000)));
}

#[test]
fn renewal_keeps_the_lease_fresh() {
    let (store, mut a, mut b) = pair();
    a.try_acquire(1_000).unwrap();
    a.ensure(1_250).unwrap();
    assert_eq!(store.read().unwrap().unwrap().timestamp, 1_250);
    // 300s after the first write, but only 250s after renewal
    assert!(b.try_acquire(1_500).is_err());
}

#[test]
fn stale_lease_is_taken_over_and_old_leader_steps_down() {
    let (_store, mut a, mut b) = pair();
    a.try_acquire(1_000).unwrap();

    // exactly at the threshold the lease still counts as live
    assert!(b.try_acquire(1_300).is_err());
    b.try_acquire(1_301).unwrap();
    assert!(b.is_leader());

    let err = a.renew(1_302).unwrap_err();
    assert!(matches!(err, RelayError::LeaseConflict { .. }));
    assert_eq!(a.state(), LeaseState::Expired);
    assert!(!a.is_leader());
}

#[test]
fn release_hands_over_immediately() {
    let (store, mut a, mut b) = pair();
    a.try_acquire(1_000).unwrap();
    a.release().unwrap();
    assert_eq!(a.state(), LeaseState::Released);
    assert_eq!(store.read().unwrap(), None);

    b.try_acquire(1_001).unwrap();
    assert!(b.is_leader());
}

#[test]
fn release_never_clears_someone_elses_lease() {
    let (store, mut a, mut b) = pair();
    a.try_acquire(1_000).unwrap();
    b.try_acquire(2_000).unwrap();
    a.release().unwrap();
    assert_eq!(store.read().unwrap().map(|l| l.owner), Some("runner-b".to_string()));
}

#[test]
fn file_lease_is_shared_between_runners() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.lease");
    let mut a = LeaderElector::new(Box::new(FileLeaseStore::new(&path)), "host-a:41", STALE);
    let mut b = LeaderElector::new(Box::new(FileLeaseStore::new(&path)), "host-b:42", STALE);

    a.try_acquire(10_000).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "host-a:41:10000");
    assert!(b.try_acquire(10_010).is_err());

    a.release().unwrap();
    assert!(!path.exists());
    b.try_acquire(10_020).unwrap();
}

#[tokio::test]
async fn waiting_on_a_dead_lease_returns_at_once() {
    let store = MemoryLeaseStore::new();
    store.write(&LeaderLease::new("crashed-runner", 0)).unwrap();
    let mut e = LeaderElector::new(Box::new(store.clone()), "fresh", STALE);
    e.wait_for_leadership(Duration::from_millis(10)).await;
    assert!(e.is_leader());
    assert_eq!(store.read().unwrap().unwrap().owner, "fresh");
}
