//! Origins — bitemporal fact store.
//!
//! The core primitive is a [`Fact`]: an entity-attribute-value triple with an
//! assert/retract [`Operation`], the transaction that recorded it, and the
//! valid time at which it holds in the world.
//!
//! **Transaction time** is monotonic by construction: segments are written in
//! commit order under increasing transaction ids. **Valid time** carries no
//! such guarantee — a value may be retracted before we learn when its
//! replacement was asserted. The [`gaps`] detector measures exactly that lag.
//!
//! Facts are persisted per *domain* through a [`Store`], which frames each
//! batch into a segment and hands it to a domain [`Partition`] sitting on top
//! of a minimal key/value [`Engine`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use origins::{Fact, IdentCache, MemoryEngine, Store};
//!
//! let store = Store::init("demo", Arc::new(MemoryEngine::new())).unwrap();
//!
//! let mut idents = IdentCache::default();
//! let e = idents.add("people", "alice");
//! let a = idents.add("people", "works_at");
//! let v = idents.add("orgs", "Acme");
//!
//! // Write one transaction to the "people" domain.
//! store.write_segment("people", 1u64, &[Fact::assert(e, a, v)], true).unwrap();
//!
//! // Stream it back.
//! for fact in store.reader("people").unwrap() {
//!     println!("{}", fact.unwrap());
//! }
//! ```

pub mod config;
pub mod engine;
pub mod fact;
pub mod frame;
pub mod gaps;
pub mod ident;
pub mod partition;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{Config, StorageKind};
pub use engine::{Engine, MemoryEngine, RedbEngine};
pub use fact::{Fact, Operation};
pub use frame::{decode_segment, encode_segment, SegmentDecoder, MAX_FACT_SIZE};
pub use gaps::{gaps, gaps_with_policy, Gap, GapSet, RetractionPolicy};
pub use ident::{Ident, IdentCache};
pub use partition::Partition;
pub use store::{IntoTxKey, Reader, Store, VERSION};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OriginsError {
    #[error("engine error: {0}")]
    Engine(String),
    #[error("store version is {found}, but this client uses version {expected}")]
    VersionMismatch { found: i32, expected: i32 },
    #[error("fact size {size} exceeds maximum allowed {max}")]
    OversizedFact { size: usize, max: usize },
    #[error("corrupt segment at byte {offset}: {reason}")]
    CorruptSegment { offset: usize, reason: String },
    #[error("segment key must be a non-negative integer value, got {0}")]
    InvalidTransactionKey(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("config error: {0}")]
    Config(String),
}

impl From<bincode::Error> for OriginsError {
    fn from(e: bincode::Error) -> Self {
        OriginsError::Serialization(e.to_string())
    }
}
impl From<redb::DatabaseError> for OriginsError {
    fn from(e: redb::DatabaseError) -> Self {
        OriginsError::Engine(e.to_string())
    }
}
impl From<redb::TransactionError> for OriginsError {
    fn from(e: redb::TransactionError) -> Self {
        OriginsError::Engine(e.to_string())
    }
}
impl From<redb::TableError> for OriginsError {
    fn from(e: redb::TableError) -> Self {
        OriginsError::Engine(e.to_string())
    }
}
impl From<redb::StorageError> for OriginsError {
    fn from(e: redb::StorageError) -> Self {
        OriginsError::Engine(e.to_string())
    }
}
impl From<redb::CommitError> for OriginsError {
    fn from(e: redb::CommitError) -> Self {
        OriginsError::Engine(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OriginsError>;
