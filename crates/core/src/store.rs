//! The store: a named, versioned set of domain partitions over one engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::frame::{encode_segment, SegmentDecoder};
use crate::partition::{Partition, SegmentReader};
use crate::{Engine, Fact, OriginsError, Result};

/// Version of the on-disk layout. A store written under a different version
/// is refused by [`Store::init`].
pub const VERSION: i32 = 0;

/// Persisted store header.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    name: String,
    version: i32,
}

fn store_key(name: &str) -> String {
    format!("origins.{name}")
}

fn partition_key(store_key: &str, domain: &str) -> String {
    format!("{store_key}.{domain}")
}

// ---------------------------------------------------------------------------
// Transaction keys
// ---------------------------------------------------------------------------

/// Values accepted as a segment's transaction id.
///
/// Every primitive integer type converts as long as it is non-negative.
/// Strings convert only when they are one or more ASCII digits that fit in a
/// `u64`; signs, whitespace and an empty string are rejected.
pub trait IntoTxKey {
    fn into_tx_key(self) -> Result<u64>;
}

macro_rules! unsigned_tx_key {
    ($($t:ty),*) => {$(
        impl IntoTxKey for $t {
            fn into_tx_key(self) -> Result<u64> {
                Ok(self as u64)
            }
        }
    )*};
}

macro_rules! signed_tx_key {
    ($($t:ty),*) => {$(
        impl IntoTxKey for $t {
            fn into_tx_key(self) -> Result<u64> {
                u64::try_from(self)
                    .map_err(|_| OriginsError::InvalidTransactionKey(self.to_string()))
            }
        }
    )*};
}

unsigned_tx_key!(u8, u16, u32, u64, usize);
signed_tx_key!(i8, i16, i32, i64, isize);

impl IntoTxKey for &str {
    fn into_tx_key(self) -> Result<u64> {
        let invalid = || OriginsError::InvalidTransactionKey(format!("{self:?}"));
        if self.is_empty() || !self.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        self.parse::<u64>().map_err(|_| invalid())
    }
}

impl IntoTxKey for String {
    fn into_tx_key(self) -> Result<u64> {
        self.as_str().into_tx_key()
    }
}

impl IntoTxKey for &String {
    fn into_tx_key(self) -> Result<u64> {
        self.as_str().into_tx_key()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A named fact store.
///
/// The header (name and layout version) lives under `origins.<name>` and is
/// written the first time a store is initialized. Facts are written per
/// domain in segments, one per transaction.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use origins::{Fact, Ident, RedbEngine, Store};
///
/// let engine = Arc::new(RedbEngine::open("facts.redb").unwrap());
/// let store = Store::init("main", engine).unwrap();
///
/// let fact = Fact::assert(
///     Ident::new("people", "alice"),
///     Ident::new("people", "email"),
///     Ident::new("people", "alice@example.com"),
/// );
/// let bytes = store.write_segment("people", 1u64, &[fact], true).unwrap();
/// assert!(bytes > 0);
/// store.close().unwrap();
/// ```
pub struct Store {
    name: String,
    version: i32,
    store_key: String,
    engine: Arc<dyn Engine>,
    /// Partitions created so far, by domain. Each domain gets at most one.
    parts: Mutex<HashMap<String, Arc<Partition>>>,
}

impl Store {
    /// Load the store named `name`, creating and persisting its header if the
    /// engine has never seen it.
    ///
    /// # Errors
    ///
    /// [`OriginsError::VersionMismatch`] if the persisted header was written
    /// under a different [`VERSION`]. There is no migration path; callers
    /// should treat this as fatal unless they supply one.
    pub fn init(name: impl Into<String>, engine: Arc<dyn Engine>) -> Result<Self> {
        let name = name.into();
        let store_key = store_key(&name);

        let version = match engine.get(&store_key)? {
            None => {
                let header = Header {
                    name: name.clone(),
                    version: VERSION,
                };
                engine.set(&store_key, &bincode::serialize(&header)?)?;
                debug!("initialized new store named '{name}'");
                VERSION
            }
            Some(bytes) => {
                let header: Header = bincode::deserialize(&bytes)?;
                if header.version != VERSION {
                    let err = OriginsError::VersionMismatch {
                        found: header.version,
                        expected: VERSION,
                    };
                    error!("store '{name}': {err}");
                    return Err(err);
                }
                debug!("initialized existing store named '{}'", header.name);
                header.version
            }
        };

        Ok(Self {
            name,
            version,
            store_key,
            engine,
            parts: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Domains with a partition materialized in this process, sorted.
    pub fn domains(&self) -> Vec<String> {
        let parts = self.parts.lock().unwrap_or_else(PoisonError::into_inner);
        let mut domains: Vec<String> = parts.keys().cloned().collect();
        domains.sort();
        domains
    }

    /// Return the domain's partition, creating and caching it on first use.
    ///
    /// The cache lock covers only the lookup-or-insert; partition
    /// construction does no I/O.
    fn partition(&self, domain: &str) -> Arc<Partition> {
        let mut parts = self.parts.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(p) = parts.get(domain) {
            debug!("found partition {domain} in local cache");
            return Arc::clone(p);
        }

        let key = partition_key(&self.store_key, domain);
        let p = Arc::new(Partition::init(key, Arc::clone(&self.engine)));
        parts.insert(domain.to_string(), Arc::clone(&p));
        p
    }

    /// Read every committed segment of `domain`.
    pub fn reader(&self, domain: &str) -> Result<Reader> {
        self.range_reader(domain, 0, 0)
    }

    /// Read the segments of `domain` with `min <= tx <= max`, in ascending
    /// transaction order. `(0, 0)` is unbounded.
    pub fn range_reader(&self, domain: &str, min: u64, max: u64) -> Result<Reader> {
        let segments = self.partition(domain).reader(min, max)?;
        Ok(Reader {
            min,
            max,
            segments,
            current: None,
            tx: None,
            done: false,
        })
    }

    /// Frame `facts` into a segment and, if `commit` is set, write it to
    /// `domain` under transaction `tx`.
    ///
    /// Returns the total encoded size of the facts, excluding the frame
    /// prefixes. With `commit == false` nothing is written: neither the
    /// partition nor the engine is touched, which makes this usable to size
    /// or validate a batch.
    ///
    /// An empty batch is a no-op that returns `Ok(0)`.
    pub fn write_segment(
        &self,
        domain: &str,
        tx: impl IntoTxKey,
        facts: &[Fact],
        commit: bool,
    ) -> Result<usize> {
        if facts.is_empty() {
            warn!("no facts to write to {domain}");
            return Ok(0);
        }

        let key = tx.into_tx_key()?;
        let (segment, total) = encode_segment(facts)?;

        if commit {
            self.partition(domain).write(key, &segment)?;
        }

        Ok(total)
    }

    /// Close the underlying engine. The store must not be used afterwards.
    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Single-pass stream of the facts in a range of a domain's segments.
///
/// Facts come out segment by segment in ascending transaction order, and in
/// batch order within a segment. The first error ends the stream.
pub struct Reader {
    min: u64,
    max: u64,
    segments: SegmentReader,
    current: Option<SegmentDecoder>,
    tx: Option<u64>,
    done: bool,
}

impl Reader {
    /// Lower transaction bound this reader was opened with.
    pub fn min_tx(&self) -> u64 {
        self.min
    }

    /// Upper transaction bound this reader was opened with.
    pub fn max_tx(&self) -> u64 {
        self.max
    }

    /// Transaction id of the segment the last fact came from.
    pub fn transaction(&self) -> Option<u64> {
        self.tx
    }
}

impl Iterator for Reader {
    type Item = Result<Fact>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(decoder) = self.current.as_mut() {
                match decoder.next() {
                    Some(Ok(fact)) => return Some(Ok(fact)),
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            match self.segments.next()? {
                Ok((tx, segment)) => {
                    self.tx = Some(tx);
                    self.current = Some(SegmentDecoder::new(segment));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
