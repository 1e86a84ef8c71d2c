//! Integration tests for the 2PC coordinator
//!
//! The engine here records begins/commits/rollbacks so tests can observe
//! exactly which writes reached durable storage, including after a
//! simulated crash (dropping the coordinator and engine and reopening the
//! log directory with fresh ones).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tablet_common::{
    BoundQuery, Dtid, DtidState, ErrorCode, ExecuteOptions, Field, Participant, QueryResult,
    Result, TransactionId,
};
use tablet_twopc::{TwoPcConfig, TwoPhaseCoordinator};
use tablet_txpool::{QueryEngine, Registry, TxPoolConfig};

/// Engine that journals per-transaction writes and applies them on commit.
#[derive(Default)]
struct RecordingEngine {
    open: Mutex<HashMap<TransactionId, Vec<BoundQuery>>>,
    applied: Mutex<Vec<String>>,
}

impl RecordingEngine {
    fn applied_sql(&self) -> Vec<String> {
        self.applied.lock().clone()
    }
}

impl QueryEngine for RecordingEngine {
    fn begin(&self, txn_id: TransactionId, _options: &ExecuteOptions) -> Result<()> {
        self.open.lock().insert(txn_id, Vec::new());
        Ok(())
    }

    fn execute(&self, query: &BoundQuery, txn_id: Option<TransactionId>) -> Result<QueryResult> {
        if let Some(txn_id) = txn_id {
            if let Some(journal) = self.open.lock().get_mut(&txn_id) {
                journal.push(query.clone());
            }
        } else {
            self.applied.lock().push(query.sql.clone());
        }
        Ok(QueryResult {
            rows_affected: 1,
            ..Default::default()
        })
    }

    fn commit(&self, txn_id: TransactionId) -> Result<()> {
        if let Some(journal) = self.open.lock().remove(&txn_id) {
            let mut applied = self.applied.lock();
            applied.extend(journal.into_iter().map(|q| q.sql));
        }
        Ok(())
    }

    fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        self.open.lock().remove(&txn_id);
        Ok(())
    }

    fn fields_for(&self, _query: &BoundQuery) -> Result<Vec<Field>> {
        Ok(Vec::new())
    }

    fn stream_execute(
        &self,
        _query: &BoundQuery,
        _batch_size: usize,
        _sink: &mut dyn FnMut(QueryResult) -> Result<()>,
    ) -> Result<()> {
        Ok(())
    }

    fn column_range(&self, _query: &BoundQuery) -> Result<(i64, i64)> {
        Ok((0, 0))
    }
}

struct Harness {
    engine: Arc<RecordingEngine>,
    registry: Arc<Registry>,
    coordinator: TwoPhaseCoordinator,
}

fn open_harness(dir: &std::path::Path) -> Harness {
    let engine = Arc::new(RecordingEngine::default());
    let registry = Arc::new(Registry::new(engine.clone(), TxPoolConfig::default()));
    let coordinator =
        TwoPhaseCoordinator::open(&TwoPcConfig::new(dir), registry.clone()).unwrap();
    Harness {
        engine,
        registry,
        coordinator,
    }
}

fn dtid(s: &str) -> Dtid {
    Dtid::new(s).unwrap()
}

fn begin_with_writes(h: &Harness, sql: &[&str]) -> TransactionId {
    let txn_id = h.registry.begin(&ExecuteOptions::default()).unwrap();
    for s in sql {
        h.registry
            .execute_in(txn_id, &BoundQuery::new(*s))
            .unwrap();
    }
    txn_id
}

#[test]
fn test_prepared_transaction_survives_crash() {
    let dir = tempfile::tempdir().unwrap();

    // First incarnation: prepare a transaction with two writes, then
    // "crash" by dropping everything before resolution.
    {
        let h = open_harness(dir.path());
        let txn_id = begin_with_writes(&h, &["insert into t values (1)", "update t set v = 2"]);
        let name = h.coordinator.prepare(txn_id, &dtid("ks0:aa")).unwrap();
        assert_eq!(name, "ks0:aa");
        assert!(h.engine.applied_sql().is_empty());
    }

    // Second incarnation: the prepared transaction is recovered from the
    // durable log and a commit replays the original writes.
    let h = open_harness(dir.path());
    assert_eq!(h.coordinator.prepared_names(), vec!["ks0:aa".to_string()]);

    h.coordinator.commit_prepared("ks0:aa").unwrap();
    assert_eq!(
        h.engine.applied_sql(),
        vec![
            "insert into t values (1)".to_string(),
            "update t set v = 2".to_string()
        ]
    );

    // Replaying the commit after resolution still succeeds and applies
    // nothing further.
    h.coordinator.commit_prepared("ks0:aa").unwrap();
    assert_eq!(h.engine.applied_sql().len(), 2);
}

#[test]
fn test_rollback_prepared_discards_writes() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let txn_id = begin_with_writes(&h, &["insert into t values (9)"]);
    h.coordinator.prepare(txn_id, &dtid("ks0:bb")).unwrap();

    h.coordinator.rollback_prepared("ks0:bb").unwrap();
    assert!(h.engine.applied_sql().is_empty());

    // Idempotent on an already-resolved name.
    h.coordinator.rollback_prepared("ks0:bb").unwrap();
}

#[test]
fn test_prepare_unknown_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let bogus = TransactionId::from_raw(7777).unwrap();
    let err = h.coordinator.prepare(bogus, &dtid("ks0:cc")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn test_create_transaction_tolerates_identical_retry() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let d = dtid("ks0:dd");
    let participants = vec![Participant {
        shard: "-80".to_string(),
        transaction_id: TransactionId::from_raw(1).unwrap(),
    }];

    h.coordinator
        .create_transaction(&d, participants.clone())
        .unwrap();
    // Identical retry: success, one record.
    h.coordinator
        .create_transaction(&d, participants.clone())
        .unwrap();

    // Conflicting payload: rejected.
    let other = vec![Participant {
        shard: "80-".to_string(),
        transaction_id: TransactionId::from_raw(2).unwrap(),
    }];
    let err = h.coordinator.create_transaction(&d, other).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyExists);

    let meta = h.coordinator.read_transaction(&d).unwrap();
    assert_eq!(meta.state, DtidState::Prepare);
    assert_eq!(meta.participants, participants);
}

#[test]
fn test_start_commit_decides_and_commits_local() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let d = dtid("ks0:ee");
    let txn_id = begin_with_writes(&h, &["insert into t values (5)"]);
    let participants = vec![Participant {
        shard: "-80".to_string(),
        transaction_id: txn_id,
    }];
    h.coordinator.create_transaction(&d, participants).unwrap();
    h.coordinator.prepare(txn_id, &d).unwrap();

    h.coordinator.start_commit(&d, txn_id).unwrap();
    assert_eq!(
        h.engine.applied_sql(),
        vec!["insert into t values (5)".to_string()]
    );
    assert_eq!(
        h.coordinator.read_transaction(&d).unwrap().state,
        DtidState::Commit
    );

    // Idempotent replay once the decision is durable.
    h.coordinator.start_commit(&d, txn_id).unwrap();
    assert_eq!(h.engine.applied_sql().len(), 1);

    // The opposite decision is a state-machine violation.
    let err = h.coordinator.set_rollback(&d, txn_id).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
}

#[test]
fn test_set_rollback_before_prepare_rolls_back_live_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let d = dtid("ks0:ff");
    let txn_id = begin_with_writes(&h, &["insert into t values (8)"]);
    h.coordinator
        .create_transaction(
            &d,
            vec![Participant {
                shard: "-80".to_string(),
                transaction_id: txn_id,
            }],
        )
        .unwrap();

    h.coordinator.set_rollback(&d, txn_id).unwrap();
    assert!(h.engine.applied_sql().is_empty());
    assert_eq!(h.registry.open_transactions(), 0);
    assert_eq!(
        h.coordinator.read_transaction(&d).unwrap().state,
        DtidState::Rollback
    );

    // Replay is fine even though the local transaction is long gone.
    h.coordinator.set_rollback(&d, txn_id).unwrap();
}

#[test]
fn test_start_commit_rejects_foreign_transaction_id() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let d = dtid("ks0:gg");
    let txn_id = begin_with_writes(&h, &["insert into t values (3)"]);
    h.coordinator
        .create_transaction(
            &d,
            vec![Participant {
                shard: "-80".to_string(),
                transaction_id: txn_id,
            }],
        )
        .unwrap();
    h.coordinator.prepare(txn_id, &d).unwrap();

    let foreign = TransactionId::from_raw(999_999).unwrap();
    let err = h.coordinator.start_commit(&d, foreign).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    // Nothing was committed by the rejected call.
    assert!(h.engine.applied_sql().is_empty());
}

#[test]
fn test_conclude_requires_decision() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let d = dtid("ks0:hh");
    let txn_id = begin_with_writes(&h, &["insert into t values (4)"]);
    h.coordinator
        .create_transaction(
            &d,
            vec![Participant {
                shard: "-80".to_string(),
                transaction_id: txn_id,
            }],
        )
        .unwrap();

    let err = h.coordinator.conclude_transaction(&d).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    h.coordinator.prepare(txn_id, &d).unwrap();
    h.coordinator.start_commit(&d, txn_id).unwrap();
    h.coordinator.conclude_transaction(&d).unwrap();

    assert_eq!(
        h.coordinator.read_transaction(&d).unwrap().state,
        DtidState::Absent
    );

    // Concluding an erased dtid is a harmless replay.
    h.coordinator.conclude_transaction(&d).unwrap();
}

#[test]
fn test_read_transaction_unknown_is_absent_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let h = open_harness(dir.path());

    let d = dtid("ks0:never-created");
    let meta = h.coordinator.read_transaction(&d).unwrap();
    assert_eq!(meta.state, DtidState::Absent);
    assert!(meta.participants.is_empty());

    // Reading again still finds nothing: the read created no record.
    let meta = h.coordinator.read_transaction(&d).unwrap();
    assert_eq!(meta.state, DtidState::Absent);
}

#[test]
fn test_decision_survives_crash() {
    let dir = tempfile::tempdir().unwrap();
    let d = dtid("ks0:ii");

    {
        let h = open_harness(dir.path());
        let txn_id = begin_with_writes(&h, &["insert into t values (6)"]);
        h.coordinator
            .create_transaction(
                &d,
                vec![Participant {
                    shard: "-80".to_string(),
                    transaction_id: txn_id,
                }],
            )
            .unwrap();
        h.coordinator.prepare(txn_id, &d).unwrap();
        h.coordinator.start_commit(&d, txn_id).unwrap();
        // Crash before conclude.
    }

    let h = open_harness(dir.path());
    let meta = h.coordinator.read_transaction(&d).unwrap();
    assert_eq!(meta.state, DtidState::Commit);
    h.coordinator.conclude_transaction(&d).unwrap();
}
