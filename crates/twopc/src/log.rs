//! Durable coordinator log
//!
//! Two fjall partitions back the coordinator: one for prepared
//! transactions (keyed by prepared name), one for distributed-transaction
//! metadata (keyed by dtid). Every write is synced to disk before the call
//! returns; acknowledging a prepare or a decision before its record is
//! durable would break crash recovery, so there is no buffered mode.

use fjall::{Keyspace, Partition, PartitionCreateOptions, PersistMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tablet_common::{
    BoundQuery, Dtid, DtidState, Error, Participant, Result, Timestamp, TransactionId,
};

/// Durable record of a prepared transaction, written by `Prepare` and
/// erased once the transaction is resolved. Holds everything needed to
/// replay the writes after a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRecord {
    /// The local transaction the record was prepared from.
    pub transaction_id: TransactionId,
    /// Queries executed under the transaction, in execution order.
    pub redo: Vec<BoundQuery>,
    pub created_at: Timestamp,
}

/// Durable metadata of a distributed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtidRecord {
    pub state: DtidState,
    pub participants: Vec<Participant>,
    pub created_at: Timestamp,
}

/// The coordinator's durable log.
pub struct CoordinatorLog {
    keyspace: Keyspace,
    prepared: Partition,
    dtids: Partition,
}

impl CoordinatorLog {
    /// Open (or create) the log under `path`.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::Internal(format!("creating log directory: {}", e)))?;

        let keyspace = fjall::Config::new(path)
            .open()
            .map_err(|e| Error::Internal(format!("opening coordinator log: {}", e)))?;

        let prepared = keyspace
            .open_partition("prepared", PartitionCreateOptions::default())
            .map_err(|e| Error::Internal(format!("opening prepared partition: {}", e)))?;
        let dtids = keyspace
            .open_partition("dtid", PartitionCreateOptions::default())
            .map_err(|e| Error::Internal(format!("opening dtid partition: {}", e)))?;

        Ok(Self {
            keyspace,
            prepared,
            dtids,
        })
    }

    /// Fsync-equivalent barrier. Called after every mutation.
    fn sync(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| Error::Aborted(format!("durable log sync failed: {}", e)))
    }

    pub fn put_prepared(&self, name: &str, record: &PreparedRecord) -> Result<()> {
        let bytes = encode(record)?;
        self.prepared
            .insert(name, bytes)
            .map_err(|e| Error::Aborted(format!("writing prepared record: {}", e)))?;
        self.sync()
    }

    pub fn remove_prepared(&self, name: &str) -> Result<()> {
        self.prepared
            .remove(name)
            .map_err(|e| Error::Internal(format!("removing prepared record: {}", e)))?;
        self.sync()
    }

    /// All prepared records, for startup recovery.
    pub fn load_prepared(&self) -> Result<Vec<(String, PreparedRecord)>> {
        let mut records = Vec::new();
        for entry in self.prepared.iter() {
            let (key, value) =
                entry.map_err(|e| Error::Internal(format!("scanning prepared log: {}", e)))?;
            let name = String::from_utf8_lossy(&key).to_string();
            records.push((name, decode(&value)?));
        }
        Ok(records)
    }

    pub fn put_dtid(&self, dtid: &Dtid, record: &DtidRecord) -> Result<()> {
        let bytes = encode(record)?;
        self.dtids
            .insert(dtid.as_str(), bytes)
            .map_err(|e| Error::Aborted(format!("writing dtid record: {}", e)))?;
        self.sync()
    }

    pub fn get_dtid(&self, dtid: &Dtid) -> Result<Option<DtidRecord>> {
        let value = self
            .dtids
            .get(dtid.as_str())
            .map_err(|e| Error::Internal(format!("reading dtid record: {}", e)))?;
        value.map(|v| decode(&v)).transpose()
    }

    pub fn remove_dtid(&self, dtid: &Dtid) -> Result<()> {
        self.dtids
            .remove(dtid.as_str())
            .map_err(|e| Error::Internal(format!("removing dtid record: {}", e)))?;
        self.sync()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| Error::Internal(format!("encoding log record: {}", e)))?;
    Ok(bytes)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes)
        .map_err(|e| Error::Internal(format!("decoding log record: {}", e)))
}
