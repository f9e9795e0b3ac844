//! Fact generators and engine probes for tests.
//!
//! Compiled for this crate's own tests, or for dependents through the
//! `testutil` feature.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Engine, Fact, IdentCache, MemoryEngine, Result};

fn rand_u64() -> u64 {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).expect("system entropy source unavailable");
    u64::from_le_bytes(buf)
}

/// `n` asserted facts with random entity, attribute and value in `domain`.
pub fn rand_facts(n: usize, domain: &str) -> Vec<Fact> {
    let mut cache = IdentCache::default();
    (0..n)
        .map(|_| {
            let e = cache.add(domain, &rand_u64().to_string());
            let a = cache.add(domain, &rand_u64().to_string());
            let v = cache.add(domain, &rand_u64().to_string());
            Fact::assert(e, a, v)
        })
        .collect()
}

/// Like [`rand_facts`], with a random transaction ident on every fact.
pub fn rand_facts_with_tx(n: usize, domain: &str) -> Vec<Fact> {
    let mut cache = IdentCache::default();
    rand_facts(n, domain)
        .into_iter()
        .map(|f| f.with_transaction(cache.add(domain, &rand_u64().to_string())))
        .collect()
}

/// In-memory engine that counts calls, for asserting what a code path did
/// not touch.
#[derive(Default)]
pub struct CountingEngine {
    inner: MemoryEngine,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingEngine {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl Engine for CountingEngine {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
