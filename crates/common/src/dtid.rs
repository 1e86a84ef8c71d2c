//! Distributed transaction identifiers and 2PC metadata

use crate::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster-wide identifier for a distributed transaction. Minted by the
/// layer coordinating the shards; this tablet only stores and compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dtid(String);

impl Dtid {
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() {
            return Err("dtid must be non-empty".to_string());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One participant shard in a distributed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Shard name, as known to the routing layer.
    pub shard: String,
    /// The participant's local transaction id on its own tablet.
    pub transaction_id: TransactionId,
}

/// Decision state of a distributed transaction.
///
/// `Prepare` is the only state a record is created in. Once `Commit` or
/// `Rollback` is durably recorded the state never changes again; the record
/// is eventually erased wholesale by `ConcludeTransaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtidState {
    /// No record exists for this dtid. Never stored; only reported by reads.
    Absent,
    Prepare,
    Commit,
    Rollback,
}

/// Snapshot of a distributed transaction's metadata, as returned by
/// `ReadTransaction`. Reading never mutates and never fails for an unknown
/// dtid; recovery tooling polls this routinely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub dtid: Dtid,
    pub state: DtidState,
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtid_rejects_empty() {
        assert!(Dtid::new("").is_err());
        assert!(Dtid::new("shard0:17").is_ok());
    }
}
