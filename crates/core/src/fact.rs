//! The fact record and its single-fact binary encoding.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Ident, Result};

/// Whether a fact asserts or retracts its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Assert,
    Retract,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Assert => write!(f, "assert"),
            Operation::Retract => write!(f, "retract"),
        }
    }
}

/// An entity-attribute-value triple with an operation and two time axes.
///
/// - **Transaction time** is carried by `transaction`: the segment a fact is
///   written under is keyed by an increasing transaction id, so commit order
///   is monotonic.
/// - **Valid time** is `time`, in microseconds since the Unix epoch. It is
///   whatever the source claims and may arrive out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub entity: Ident,
    pub attribute: Ident,
    pub value: Ident,
    /// Transaction that recorded the fact. `None` until one is assigned.
    pub transaction: Option<Ident>,
    /// Valid time, microseconds since the Unix epoch.
    pub time: i64,
    pub operation: Operation,
}

impl Fact {
    fn new(entity: Ident, attribute: Ident, value: Ident, operation: Operation) -> Self {
        Self {
            entity,
            attribute,
            value,
            transaction: None,
            time: Utc::now().timestamp_micros(),
            operation,
        }
    }

    /// Assert `value` for the entity/attribute pair, valid as of now.
    pub fn assert(entity: Ident, attribute: Ident, value: Ident) -> Self {
        Self::new(entity, attribute, value, Operation::Assert)
    }

    /// Retract `value` for the entity/attribute pair, valid as of now.
    pub fn retract(entity: Ident, attribute: Ident, value: Ident) -> Self {
        Self::new(entity, attribute, value, Operation::Retract)
    }

    /// Replace the valid time (microseconds since the Unix epoch).
    pub fn with_time(mut self, micros: i64) -> Self {
        self.time = micros;
        self
    }

    pub fn with_transaction(mut self, transaction: Ident) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Valid time as a UTC timestamp. `None` if out of chrono's range.
    pub fn valid_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.time)
    }

    pub fn is_retraction(&self) -> bool {
        self.operation == Operation::Retract
    }

    /// Encode this fact on its own, without any framing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a fact produced by [`Fact::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} @{}",
            self.operation, self.entity, self.attribute, self.value, self.time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Ident {
        Ident::new("test", name)
    }

    #[test]
    fn bytes_decode_to_equal_fact() {
        let fact = Fact::retract(ident("e"), ident("a"), ident("v"))
            .with_time(1_700_000_000_000_000)
            .with_transaction(ident("tx1"));
        let decoded = Fact::from_bytes(&fact.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, fact);
    }

    #[test]
    fn assert_stamps_current_valid_time() {
        let before = Utc::now().timestamp_micros();
        let fact = Fact::assert(ident("e"), ident("a"), ident("v"));
        let after = Utc::now().timestamp_micros();
        assert!(fact.time >= before && fact.time <= after);
        assert_eq!(fact.operation, Operation::Assert);
        assert!(fact.transaction.is_none());
    }

    #[test]
    fn valid_at_converts_micros() {
        let fact = Fact::assert(ident("e"), ident("a"), ident("v")).with_time(1_500_000);
        let at = fact.valid_at().unwrap();
        assert_eq!(at.timestamp(), 1);
        assert_eq!(at.timestamp_subsec_micros(), 500_000);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(Fact::from_bytes(&[0xff, 0x01]).is_err());
    }
}
