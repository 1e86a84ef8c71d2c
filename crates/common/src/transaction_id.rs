//! Tablet-local transaction identifiers
//!
//! A transaction id is an opaque non-zero integer, unique for the lifetime
//! of an open transaction on one tablet. Absence of an id (`Option::None`
//! everywhere in the API) means "not in a transaction".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque non-zero transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wrap a raw id. Returns `None` for zero, which is reserved for
    /// "no transaction" on the wire.
    pub fn from_raw(id: u64) -> Option<Self> {
        if id == 0 { None } else { Some(Self(id)) }
    }

    /// Get the raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse from the decimal string representation.
    pub fn parse(s: &str) -> Result<Self, String> {
        let raw: u64 = s
            .parse()
            .map_err(|e| format!("invalid transaction id {:?}: {}", s, e))?;
        Self::from_raw(raw).ok_or_else(|| "transaction id must be non-zero".to_string())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for transaction ids.
///
/// Seeded from the wall clock in nanoseconds so ids handed out after a
/// restart never collide with ids from the previous incarnation. A stale id
/// presented after restart therefore always misses the registry and is
/// reported as not found, which is the contract callers rely on.
pub struct TransactionIdGenerator {
    next: AtomicU64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self {
            next: AtomicU64::new(seed.max(1)),
        }
    }

    /// Hand out the next id. Monotonic within a process.
    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_reserved() {
        assert_eq!(TransactionId::from_raw(0), None);
        assert!(TransactionId::parse("0").is_err());
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = TransactionId::from_raw(42).unwrap();
        let parsed = TransactionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_generator_unique_and_monotonic() {
        let generator = TransactionIdGenerator::new();
        let mut ids = Vec::new();
        for _ in 0..100 {
            ids.push(generator.next_id());
        }
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_generator_never_yields_zero() {
        let generator = TransactionIdGenerator::new();
        assert_ne!(generator.next_id().as_u64(), 0);
    }
}
