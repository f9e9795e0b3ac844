use std::sync::Arc;

use chrono::Duration;
use origins::{gaps, Engine, Fact, IdentCache, OriginsError, RedbEngine, Store, VERSION};
use tempfile::NamedTempFile;

fn open(path: &std::path::Path) -> Store {
    Store::init("history", Arc::new(RedbEngine::open(path).unwrap())).unwrap()
}

#[test]
fn facts_written_in_transactions_feed_gap_detection() {
    let tmp = NamedTempFile::new().unwrap();
    let mut idents = IdentCache::default();
    let alice = idents.add("people", "alice");
    let employer = idents.add("people", "employer");
    let acme = idents.add("orgs", "acme");
    let initech = idents.add("orgs", "initech");

    {
        let store = open(tmp.path());
        // tx 1 learns alice left Acme at t=1_000.
        let left = Fact::retract(alice.clone(), employer.clone(), acme.clone()).with_time(1_000);
        store.write_segment("people", 1u64, &[left], true).unwrap();
        // tx 2 learns, later, she joined Initech at t=5_000.
        let joined =
            Fact::assert(alice.clone(), employer.clone(), initech.clone()).with_time(5_000);
        store.write_segment("people", 2u64, &[joined], true).unwrap();
        // Unrelated domain.
        let city = idents.add("orgs", "city");
        let other = Fact::assert(acme.clone(), city, idents.add("orgs", "springfield"));
        store.write_segment("orgs", 1u64, &[other], true).unwrap();
        store.close().unwrap();
    }

    let store = open(tmp.path());
    let facts: Vec<Fact> = store
        .reader("people")
        .unwrap()
        .collect::<origins::Result<_>>()
        .unwrap();
    assert_eq!(facts.len(), 2);

    let sets = gaps(&facts, Duration::microseconds(3_000));
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].entity, alice);
    assert_eq!(sets[0].gaps[0].retracted, acme);
    assert_eq!(sets[0].gaps[0].asserted, initech);
    assert_eq!(sets[0].gaps[0].duration, Duration::microseconds(4_000));

    assert!(gaps(&facts, Duration::microseconds(4_000)).is_empty());

    // Only the second transaction.
    let late: Vec<Fact> = store
        .range_reader("people", 2, 2)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].value, initech);
}

#[test]
fn version_drift_is_reported_after_restart() {
    let tmp = NamedTempFile::new().unwrap();
    {
        // Header as an older or newer client would have written it.
        let engine = RedbEngine::open(tmp.path()).unwrap();
        let header = bincode::serialize(&("history".to_string(), VERSION + 1)).unwrap();
        engine.set("origins.history", &header).unwrap();
        engine.close().unwrap();
    }

    let engine = Arc::new(RedbEngine::open(tmp.path()).unwrap());
    match Store::init("history", engine) {
        Err(OriginsError::VersionMismatch { found, expected }) => {
            assert_eq!(found, VERSION + 1);
            assert_eq!(expected, VERSION);
        }
        other => panic!("expected version mismatch, got {other:?}"),
    }
}
