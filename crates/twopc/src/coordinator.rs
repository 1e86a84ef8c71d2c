//! 2PC coordinator
//!
//! Drives the per-dtid state machine `ABSENT -> PREPARE -> {COMMIT |
//! ROLLBACK} -> ABSENT` and owns the pool of prepared transactions.
//!
//! The coordinator never guesses intent. Absence of a durable decision
//! record means "still undecided", and every operation here tolerates
//! being replayed after the fact: a crashed resolver re-runs the same
//! calls and reaches the same terminal state.
//!
//! Mutations to a single dtid (and to its prepared transaction, which
//! shares the dtid-derived name) are serialized by a per-name lock;
//! unrelated dtids proceed in parallel.

use crate::config::TwoPcConfig;
use crate::log::{CoordinatorLog, DtidRecord, PreparedRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tablet_common::{
    Dtid, DtidState, Error, ExecuteOptions, Participant, Result, Timestamp, TransactionId,
    TransactionIdGenerator, TransactionMetadata,
};
use tablet_txpool::Registry;

/// A prepared transaction held in memory.
struct PreparedTransaction {
    record: PreparedRecord,
    /// The engine transaction kept open since the prepare. `None` after a
    /// restart: the engine transaction died with the process, and a commit
    /// must replay the redo log in a fresh one.
    live_txn: Option<TransactionId>,
}

/// The two-phase-commit coordinator for one tablet.
pub struct TwoPhaseCoordinator {
    log: CoordinatorLog,
    registry: Arc<Registry>,
    prepared: DashMap<String, PreparedTransaction>,
    /// Per-name mutation locks. Entries are tiny and kept for the process
    /// lifetime so a lock is never swapped out from under a waiter.
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    id_gen: TransactionIdGenerator,
}

impl TwoPhaseCoordinator {
    /// Open the coordinator, reloading prepared transactions left behind
    /// by a previous incarnation.
    pub fn open(config: &TwoPcConfig, registry: Arc<Registry>) -> Result<Self> {
        let log = CoordinatorLog::open(&config.data_dir)?;

        let prepared = DashMap::new();
        for (name, record) in log.load_prepared()? {
            prepared.insert(
                name,
                PreparedTransaction {
                    record,
                    live_txn: None,
                },
            );
        }
        if !prepared.is_empty() {
            tracing::info!(
                count = prepared.len(),
                "recovered prepared transactions from durable log"
            );
        }

        Ok(Self {
            log,
            registry,
            prepared,
            name_locks: DashMap::new(),
            id_gen: TransactionIdGenerator::new(),
        })
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.name_locks
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Names of the currently unresolved prepared transactions.
    pub fn prepared_names(&self) -> Vec<String> {
        self.prepared.iter().map(|e| e.key().clone()).collect()
    }

    // === Prepared transactions ===

    /// Convert a live local transaction into a durably logged prepared
    /// transaction named after its dtid. The transaction's writes survive
    /// restart from here on; only `CommitPrepared`/`RollbackPrepared`
    /// resolve it.
    pub fn prepare(&self, txn_id: TransactionId, dtid: &Dtid) -> Result<String> {
        let name = dtid.as_str().to_string();
        let lock = self.name_lock(&name);
        let _guard = lock.lock();

        if self.prepared.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "prepared transaction {} already exists",
                name
            )));
        }

        let redo = self.registry.take_for_prepare(txn_id)?;
        let record = PreparedRecord {
            transaction_id: txn_id,
            redo,
            created_at: Timestamp::now(),
        };

        if let Err(e) = self.log.put_prepared(&name, &record) {
            // The durable record never existed, so nothing may survive:
            // roll the engine transaction back and report the abort.
            if let Err(rollback_err) = self.registry.engine().rollback(txn_id) {
                tracing::warn!(%txn_id, "rollback after failed prepare: {}", rollback_err);
            }
            return Err(e);
        }

        self.prepared.insert(
            name.clone(),
            PreparedTransaction {
                record,
                live_txn: Some(txn_id),
            },
        );
        tracing::info!(%txn_id, name = %name, "transaction prepared");
        Ok(name)
    }

    /// Resolve a prepared transaction as committed. Succeeds when the
    /// prepared transaction no longer exists: crash-recovery replays this
    /// call and an already-resolved name is the expected case.
    pub fn commit_prepared(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let _guard = lock.lock();
        self.commit_prepared_locked(name, None)
    }

    fn commit_prepared_locked(
        &self,
        name: &str,
        expected_txn: Option<TransactionId>,
    ) -> Result<()> {
        if let Some(expected) = expected_txn {
            let owner = self.prepared.get(name).map(|e| e.record.transaction_id);
            if let Some(owner) = owner {
                if owner != expected {
                    return Err(Error::FailedPrecondition(format!(
                        "prepared transaction {} belongs to {}, not {}",
                        name, owner, expected
                    )));
                }
            }
        }

        let Some((_, pt)) = self.prepared.remove(name) else {
            tracing::debug!(name, "commit of already-resolved prepared transaction");
            return Ok(());
        };

        let result = match pt.live_txn {
            Some(txn_id) => self.registry.engine().commit(txn_id),
            None => self.replay_and_commit(&pt.record),
        };
        if let Err(e) = result {
            // Keep the prepared transaction around so resolution can be
            // retried; the durable record is still on disk.
            self.prepared.insert(name.to_string(), pt);
            return Err(e);
        }

        self.log.remove_prepared(name)?;
        tracing::info!(name, "prepared transaction committed");
        Ok(())
    }

    /// Re-apply a recovered redo log in a fresh engine transaction and
    /// commit it.
    fn replay_and_commit(&self, record: &PreparedRecord) -> Result<()> {
        let engine = self.registry.engine();
        let txn_id = self.id_gen.next_id();
        engine.begin(txn_id, &ExecuteOptions::default())?;
        for query in &record.redo {
            if let Err(e) = engine.execute(query, Some(txn_id)) {
                if let Err(rollback_err) = engine.rollback(txn_id) {
                    tracing::warn!(%txn_id, "rollback after failed replay: {}", rollback_err);
                }
                return Err(e);
            }
        }
        engine.commit(txn_id)
    }

    /// Resolve a prepared transaction as rolled back. Safe to replay.
    pub fn rollback_prepared(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let _guard = lock.lock();
        self.rollback_prepared_locked(name)
    }

    fn rollback_prepared_locked(&self, name: &str) -> Result<()> {
        let Some((_, pt)) = self.prepared.remove(name) else {
            tracing::debug!(name, "rollback of already-resolved prepared transaction");
            return Ok(());
        };

        if let Some(txn_id) = pt.live_txn {
            // Best effort: the writes are discarded either way, and the
            // durable record is what decides replay behavior.
            if let Err(e) = self.registry.engine().rollback(txn_id) {
                tracing::warn!(%txn_id, "engine rollback of prepared transaction: {}", e);
            }
        }

        self.log.remove_prepared(name)?;
        tracing::info!(name, "prepared transaction rolled back");
        Ok(())
    }

    // === Distributed transaction metadata ===

    /// Create the durable metadata record for a distributed transaction,
    /// in state PREPARE. A retry carrying the identical participant list
    /// succeeds; a conflicting record is rejected.
    pub fn create_transaction(&self, dtid: &Dtid, participants: Vec<Participant>) -> Result<()> {
        let lock = self.name_lock(dtid.as_str());
        let _guard = lock.lock();

        if let Some(existing) = self.log.get_dtid(dtid)? {
            if existing.state == DtidState::Prepare && existing.participants == participants {
                tracing::debug!(%dtid, "create replayed with identical payload");
                return Ok(());
            }
            return Err(Error::AlreadyExists(format!(
                "distributed transaction {} already exists",
                dtid
            )));
        }

        let record = DtidRecord {
            state: DtidState::Prepare,
            participants,
            created_at: Timestamp::now(),
        };
        self.log.put_dtid(dtid, &record)?;
        tracing::info!(%dtid, "distributed transaction created");
        Ok(())
    }

    /// Durably decide COMMIT for the dtid, then commit the local prepared
    /// transaction. Idempotent once the decision is recorded; the opposite
    /// decision is a state-machine violation.
    pub fn start_commit(&self, dtid: &Dtid, txn_id: TransactionId) -> Result<()> {
        let name = dtid.as_str().to_string();
        let lock = self.name_lock(&name);
        let _guard = lock.lock();

        let mut record = self
            .log
            .get_dtid(dtid)?
            .ok_or_else(|| Error::NotFound(format!("distributed transaction {} not found", dtid)))?;

        // Validate local ownership before recording anything durable, so a
        // rejected call leaves the state machine untouched.
        let owner = self.prepared.get(&name).map(|e| e.record.transaction_id);
        if let Some(owner) = owner {
            if owner != txn_id {
                return Err(Error::FailedPrecondition(format!(
                    "prepared transaction {} belongs to {}, not {}",
                    name, owner, txn_id
                )));
            }
        }

        match record.state {
            DtidState::Rollback => {
                return Err(Error::FailedPrecondition(format!(
                    "distributed transaction {} is already decided as rollback",
                    dtid
                )));
            }
            DtidState::Commit => {
                tracing::debug!(%dtid, "commit decision replayed");
            }
            DtidState::Prepare => {
                record.state = DtidState::Commit;
                self.log.put_dtid(dtid, &record)?;
                tracing::info!(%dtid, "commit decision recorded");
            }
            DtidState::Absent => {
                return Err(Error::Internal(format!(
                    "stored dtid record for {} has absent state",
                    dtid
                )));
            }
        }

        self.commit_prepared_locked(&name, Some(txn_id))
    }

    /// Durably decide ROLLBACK for the dtid and roll back the local
    /// participant, prepared or still live.
    pub fn set_rollback(&self, dtid: &Dtid, txn_id: TransactionId) -> Result<()> {
        let name = dtid.as_str().to_string();
        let lock = self.name_lock(&name);
        let _guard = lock.lock();

        let mut record = self
            .log
            .get_dtid(dtid)?
            .ok_or_else(|| Error::NotFound(format!("distributed transaction {} not found", dtid)))?;

        match record.state {
            DtidState::Commit => {
                return Err(Error::FailedPrecondition(format!(
                    "distributed transaction {} is already decided as commit",
                    dtid
                )));
            }
            DtidState::Rollback => {
                tracing::debug!(%dtid, "rollback decision replayed");
            }
            DtidState::Prepare => {
                record.state = DtidState::Rollback;
                self.log.put_dtid(dtid, &record)?;
                tracing::info!(%dtid, "rollback decision recorded");
            }
            DtidState::Absent => {
                return Err(Error::Internal(format!(
                    "stored dtid record for {} has absent state",
                    dtid
                )));
            }
        }

        if self.prepared.contains_key(&name) {
            return self.rollback_prepared_locked(&name);
        }

        // The local participant may not have prepared yet; roll back its
        // live transaction if it is still in the registry.
        match self.registry.rollback(txn_id) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == tablet_common::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Erase the dtid's bookkeeping. Requires a durable decision: erasing
    /// an undecided record would make the outcome unknowable.
    pub fn conclude_transaction(&self, dtid: &Dtid) -> Result<()> {
        let lock = self.name_lock(dtid.as_str());
        let _guard = lock.lock();

        match self.log.get_dtid(dtid)? {
            None => {
                tracing::debug!(%dtid, "conclude of already-erased transaction");
                Ok(())
            }
            Some(record) if record.state == DtidState::Prepare => Err(Error::FailedPrecondition(
                format!("distributed transaction {} is not yet decided", dtid),
            )),
            Some(_) => {
                self.log.remove_dtid(dtid)?;
                tracing::info!(%dtid, "distributed transaction concluded");
                Ok(())
            }
        }
    }

    /// Current state and participant list. Pure read: never fails for an
    /// unknown dtid and never creates a record.
    pub fn read_transaction(&self, dtid: &Dtid) -> Result<TransactionMetadata> {
        match self.log.get_dtid(dtid)? {
            Some(record) => Ok(TransactionMetadata {
                dtid: dtid.clone(),
                state: record.state,
                participants: record.participants,
            }),
            None => Ok(TransactionMetadata {
                dtid: dtid.clone(),
                state: DtidState::Absent,
                participants: Vec::new(),
            }),
        }
    }
}
