//! Key/value engines the store persists through.
//!
//! The store only needs three things from an engine: point reads, point
//! writes, and a way to release the underlying resource. Keys are opaque
//! UTF-8 strings built entirely by the store and its partitions; engines must
//! not assume any structure in them, and the store never asks for range scans
//! or multi-key transactions.
//!
//! Engines are shared between the store and every partition and reader it
//! hands out, so implementations must be safe for concurrent use.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use redb::{Database, ReadableDatabase, TableDefinition};

use crate::{OriginsError, Result};

/// Minimal persistence capability consumed by [`Store`](crate::Store).
pub trait Engine: Send + Sync {
    /// Fetch the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Release the engine. Any later call may fail.
    fn close(&self) -> Result<()>;
}

fn closed() -> OriginsError {
    OriginsError::Engine("engine is closed".into())
}

fn poisoned() -> OriginsError {
    OriginsError::Engine("engine lock poisoned".into())
}

// ---------------------------------------------------------------------------
// redb
// ---------------------------------------------------------------------------

/// Single-table layout: every store key maps to its raw bytes.
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// Persistent engine backed by an embedded `redb` database.
///
/// Each `set` is its own write transaction, so single-key writes are atomic
/// and durable once they return.
pub struct RedbEngine {
    db: RwLock<Option<Database>>,
}

impl RedbEngine {
    /// Open or create a database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Create a redb database with the in-memory backend (no file I/O).
    ///
    /// Data is lost when the engine is dropped or closed.
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        {
            let write_txn = db.begin_write()?;
            write_txn.open_table(ENTRIES)?;
            write_txn.commit()?;
        }
        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }
}

impl Engine for RedbEngine {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.db.read().map_err(|_| poisoned())?;
        let db = guard.as_ref().ok_or_else(closed)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let guard = self.db.read().map_err(|_| poisoned())?;
        let db = guard.as_ref().ok_or_else(closed)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Dropping the database flushes and releases the file lock.
        let db = self.db.write().map_err(|_| poisoned())?.take();
        drop(db);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Volatile engine holding every entry in a locked `HashMap`.
#[derive(Default)]
pub struct MemoryEngine {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed());
        }
        Ok(())
    }
}

impl Engine for MemoryEngine {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}
