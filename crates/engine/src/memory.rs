//! In-memory storage engine
//!
//! Implements the `QueryEngine` seam against a scripted table held in
//! memory: transactions journal their writes and apply them on commit,
//! reads return the scripted result set. Integration tests and demos run
//! the full service against this engine; it also documents, in executable
//! form, exactly what the tablet expects from a real engine.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tablet_common::{
    BoundQuery, Error, ExecuteOptions, Field, QueryResult, Result, TransactionId, Value,
};
use tablet_txpool::QueryEngine;

#[derive(Default)]
struct EngineState {
    fields: Vec<Field>,
    rows: Vec<Vec<Value>>,
    open: HashMap<TransactionId, Vec<BoundQuery>>,
    applied: Vec<String>,
}

/// Scripted in-memory engine.
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
    /// Artificial latency per engine call, for deadline tests.
    latency: Mutex<Option<Duration>>,
    fail_executes: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the table every read returns. The first column is the split
    /// column and must hold `Value::Int`s.
    pub fn with_table(self, fields: Vec<Field>, rows: Vec<Vec<Value>>) -> Self {
        {
            let mut state = self.state.lock();
            state.fields = fields;
            state.rows = rows;
        }
        self
    }

    /// Inject latency into every engine call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Make subsequent executes fail, for error-path tests.
    pub fn set_fail_executes(&self, fail: bool) {
        self.fail_executes.store(fail, Ordering::SeqCst);
    }

    /// SQL applied by committed transactions, in commit order.
    pub fn applied_sql(&self) -> Vec<String> {
        self.state.lock().applied.clone()
    }

    /// Number of currently open engine transactions.
    pub fn open_transactions(&self) -> usize {
        self.state.lock().open.len()
    }

    fn stall(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
    }
}

impl QueryEngine for MemoryEngine {
    fn begin(&self, txn_id: TransactionId, _options: &ExecuteOptions) -> Result<()> {
        self.state.lock().open.insert(txn_id, Vec::new());
        Ok(())
    }

    fn execute(&self, query: &BoundQuery, txn_id: Option<TransactionId>) -> Result<QueryResult> {
        self.stall();
        if self.fail_executes.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!(
                "scripted failure executing {:?}",
                query.sql
            )));
        }

        let mut state = self.state.lock();
        match txn_id {
            Some(txn_id) => {
                let journal = state.open.get_mut(&txn_id).ok_or_else(|| {
                    Error::NotFound(format!("engine transaction {} not open", txn_id))
                })?;
                journal.push(query.clone());
                Ok(QueryResult {
                    rows_affected: 1,
                    ..Default::default()
                })
            }
            None => Ok(QueryResult {
                fields: state.fields.clone(),
                rows: state.rows.clone(),
                ..Default::default()
            }),
        }
    }

    fn commit(&self, txn_id: TransactionId) -> Result<()> {
        self.stall();
        let mut state = self.state.lock();
        let journal = state
            .open
            .remove(&txn_id)
            .ok_or_else(|| Error::NotFound(format!("engine transaction {} not open", txn_id)))?;
        state.applied.extend(journal.into_iter().map(|q| q.sql));
        Ok(())
    }

    fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut state = self.state.lock();
        state
            .open
            .remove(&txn_id)
            .ok_or_else(|| Error::NotFound(format!("engine transaction {} not open", txn_id)))?;
        Ok(())
    }

    fn fields_for(&self, _query: &BoundQuery) -> Result<Vec<Field>> {
        Ok(self.state.lock().fields.clone())
    }

    fn stream_execute(
        &self,
        _query: &BoundQuery,
        batch_size: usize,
        sink: &mut dyn FnMut(QueryResult) -> Result<()>,
    ) -> Result<()> {
        let rows = self.state.lock().rows.clone();
        for chunk in rows.chunks(batch_size.max(1)) {
            self.stall();
            sink(QueryResult::rows_only(chunk.to_vec()))?;
        }
        Ok(())
    }

    fn column_range(&self, query: &BoundQuery) -> Result<(i64, i64)> {
        let state = self.state.lock();
        let mut range: Option<(i64, i64)> = None;
        for row in &state.rows {
            let Some(Value::Int(key)) = row.first() else {
                return Err(Error::InvalidArgument(format!(
                    "query {:?} has no integer split column",
                    query.sql
                )));
            };
            range = Some(match range {
                Some((min, max)) => (min.min(*key), max.max(*key)),
                None => (*key, *key),
            });
        }
        range.ok_or_else(|| {
            Error::InvalidArgument(format!("query {:?} addresses no rows", query.sql))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_common::ColumnType;

    fn engine_with_keys(keys: &[i64]) -> MemoryEngine {
        MemoryEngine::new().with_table(
            vec![Field::new("id", ColumnType::Int64)],
            keys.iter().map(|k| vec![Value::Int(*k)]).collect(),
        )
    }

    #[test]
    fn test_transaction_journal_applies_on_commit() {
        let engine = engine_with_keys(&[]);
        let txn_id = TransactionId::from_raw(1).unwrap();

        engine.begin(txn_id, &ExecuteOptions::default()).unwrap();
        engine
            .execute(&BoundQuery::new("insert into t values (1)"), Some(txn_id))
            .unwrap();
        assert!(engine.applied_sql().is_empty());

        engine.commit(txn_id).unwrap();
        assert_eq!(engine.applied_sql(), vec!["insert into t values (1)"]);
    }

    #[test]
    fn test_column_range() {
        let engine = engine_with_keys(&[5, -3, 12, 0]);
        let (min, max) = engine.column_range(&BoundQuery::new("select * from t")).unwrap();
        assert_eq!((min, max), (-3, 12));
    }

    #[test]
    fn test_stream_execute_batches() {
        let engine = engine_with_keys(&[1, 2, 3, 4, 5]);
        let mut batches = Vec::new();
        engine
            .stream_execute(&BoundQuery::new("select * from t"), 2, &mut |batch| {
                batches.push(batch.rows.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(batches, vec![2, 2, 1]);
    }
}
