//! Per-domain segment logs.
//!
//! A partition namespaces a domain's segments under one key prefix:
//!
//! ```text
//! <prefix>.log                      sorted transaction ids (bincode Vec<u64>)
//! <prefix>.00000000000000000042     segment written by transaction 42
//! ```
//!
//! Engines offer no range scans, so the `.log` record is how a reader finds
//! which segments exist. All durability and atomicity come from the engine;
//! a crash between the segment write and the index update leaves an
//! unreachable segment, never a dangling index entry.
//!
//! Every write reads, extends and rewrites the whole `.log` record, so one
//! write costs O(n) in the partition's transaction count and filling a
//! partition with n transactions costs O(n²) overall.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::{Engine, OriginsError, Result};

pub struct Partition {
    key_prefix: String,
    engine: Arc<dyn Engine>,
    /// Serializes the index read-modify-write between concurrent writers.
    write_lock: Mutex<()>,
}

impl Partition {
    /// Build a partition over `engine`. Performs no I/O.
    pub fn init(key_prefix: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        let key_prefix = key_prefix.into();
        debug!("initialized partition {key_prefix}");
        Self {
            key_prefix,
            engine,
            write_lock: Mutex::new(()),
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn log_key(&self) -> String {
        format!("{}.log", self.key_prefix)
    }

    /// Zero-padded so keys sort the same way as their transaction ids.
    fn segment_key(prefix: &str, tx: u64) -> String {
        format!("{prefix}.{tx:020}")
    }

    /// Transaction ids with a committed segment, ascending.
    pub fn transactions(&self) -> Result<Vec<u64>> {
        match self.engine.get(&self.log_key())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Persist `segment` under transaction `tx`, replacing any segment
    /// previously written for the same transaction.
    pub fn write(&self, tx: u64, segment: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.engine
            .set(&Self::segment_key(&self.key_prefix, tx), segment)?;

        let mut txs = self.transactions()?;
        if let Err(pos) = txs.binary_search(&tx) {
            txs.insert(pos, tx);
            self.engine.set(&self.log_key(), &bincode::serialize(&txs)?)?;
        }

        debug!(
            "wrote segment {tx} ({} bytes) to {}",
            segment.len(),
            self.key_prefix
        );
        Ok(())
    }

    /// Stream the raw segments with `min <= tx <= max`, ascending.
    ///
    /// A bound of `0` leaves that side open, so `(0, 0)` reads everything.
    /// The set of transactions is fixed when the reader is created.
    pub fn reader(&self, min: u64, max: u64) -> Result<SegmentReader> {
        let txs: Vec<u64> = self
            .transactions()?
            .into_iter()
            .filter(|&tx| (min == 0 || tx >= min) && (max == 0 || tx <= max))
            .collect();

        Ok(SegmentReader {
            key_prefix: self.key_prefix.clone(),
            engine: Arc::clone(&self.engine),
            txs: txs.into_iter(),
            done: false,
        })
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

/// Forward-only iterator over `(transaction id, segment bytes)`.
pub struct SegmentReader {
    key_prefix: String,
    engine: Arc<dyn Engine>,
    txs: std::vec::IntoIter<u64>,
    done: bool,
}

impl Iterator for SegmentReader {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tx = self.txs.next()?;
        let key = Partition::segment_key(&self.key_prefix, tx);

        let item = match self.engine.get(&key) {
            Ok(Some(segment)) => Ok((tx, segment)),
            Ok(None) => Err(OriginsError::CorruptSegment {
                offset: 0,
                reason: format!(
                    "segment {tx} is indexed but missing from {}",
                    self.key_prefix
                ),
            }),
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}
