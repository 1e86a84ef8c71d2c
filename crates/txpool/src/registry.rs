//! Live transaction registry
//!
//! Owns every open transaction id on the tablet. Each id maps to a slot
//! guarded by its own lock: at most one mutating operation runs against a
//! given transaction at a time, while unrelated transactions proceed fully
//! in parallel.
//!
//! Resolution (commit, rollback, handoff to the prepared pool) removes the
//! slot from the map first. Whichever caller removes it wins; every later
//! caller sees "not found". That single atomic step is what makes
//! concurrent commit/rollback resolve to exactly one outcome.

use crate::config::TxPoolConfig;
use crate::engine::QueryEngine;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tablet_common::{
    BoundQuery, Error, ExecuteOptions, QueryResult, Result, Timestamp, TransactionId,
    TransactionIdGenerator,
};
use tokio::task::JoinHandle;

/// State kept per open transaction.
struct TxSlot {
    options: ExecuteOptions,
    last_used: Timestamp,
    /// Queries executed under this transaction, in order. Persisted by
    /// `Prepare` so the writes can be replayed after a crash.
    redo: Vec<BoundQuery>,
    /// Set under the slot lock by the resolving caller, so a waiter that
    /// raced with resolution finds out after acquiring the lock.
    resolved: bool,
}

/// The session/transaction registry.
pub struct Registry {
    engine: Arc<dyn QueryEngine>,
    config: TxPoolConfig,
    slots: DashMap<TransactionId, Arc<Mutex<TxSlot>>>,
    active: AtomicUsize,
    id_gen: TransactionIdGenerator,
}

impl Registry {
    pub fn new(engine: Arc<dyn QueryEngine>, config: TxPoolConfig) -> Self {
        Self {
            engine,
            config,
            slots: DashMap::new(),
            active: AtomicUsize::new(0),
            id_gen: TransactionIdGenerator::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }

    /// Number of currently open transactions.
    pub fn open_transactions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Open a new transaction. Fails with `ResourceExhausted` when the
    /// concurrent-transaction limit is reached.
    pub fn begin(&self, options: &ExecuteOptions) -> Result<TransactionId> {
        let prev = self.active.fetch_add(1, Ordering::SeqCst);
        if prev >= self.config.capacity {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ResourceExhausted(format!(
                "transaction pool limit reached ({})",
                self.config.capacity
            )));
        }

        let txn_id = self.id_gen.next_id();
        if let Err(e) = self.engine.begin(txn_id, options) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }

        self.slots.insert(
            txn_id,
            Arc::new(Mutex::new(TxSlot {
                options: options.clone(),
                last_used: Timestamp::now(),
                redo: Vec::new(),
                resolved: false,
            })),
        );
        tracing::debug!(%txn_id, "transaction begun");
        Ok(txn_id)
    }

    /// Run one query inside an open transaction, recording it in the redo
    /// log for a later `Prepare`.
    pub fn execute_in(&self, txn_id: TransactionId, query: &BoundQuery) -> Result<QueryResult> {
        let slot = self
            .slots
            .get(&txn_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| unknown(txn_id))?;

        let mut guard = slot.lock();
        if guard.resolved {
            return Err(unknown(txn_id));
        }
        let result = self.engine.execute(query, Some(txn_id))?;
        guard.redo.push(query.clone());
        guard.last_used = Timestamp::now();
        Ok(result)
    }

    /// Durably apply the transaction's writes and release its id.
    pub fn commit(&self, txn_id: TransactionId) -> Result<()> {
        let slot = self.resolve(txn_id)?;
        let _guard = slot.lock();
        tracing::debug!(%txn_id, "committing transaction");
        self.engine.commit(txn_id)
    }

    /// Discard the transaction's writes and release its id. An id that is
    /// already gone reports `NotFound`; callers treat that as a harmless
    /// repeat, not a hard failure.
    pub fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let slot = self.resolve(txn_id)?;
        let _guard = slot.lock();
        tracing::debug!(%txn_id, "rolling back transaction");
        self.engine.rollback(txn_id)
    }

    /// Hand the transaction over for 2PC preparation: release its slot and
    /// return its redo log. The engine transaction stays open; the prepared
    /// pool owns it from here.
    pub fn take_for_prepare(&self, txn_id: TransactionId) -> Result<Vec<BoundQuery>> {
        let slot = self.resolve(txn_id)?;
        let mut guard = slot.lock();
        Ok(std::mem::take(&mut guard.redo))
    }

    /// Remove the slot, marking it resolved under its lock. Exactly one
    /// caller per id ever gets `Ok` here.
    fn resolve(&self, txn_id: TransactionId) -> Result<Arc<Mutex<TxSlot>>> {
        let (_, slot) = self.slots.remove(&txn_id).ok_or_else(|| unknown(txn_id))?;
        slot.lock().resolved = true;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(slot)
    }

    /// Roll back every transaction idle past the configured timeout.
    /// Returns the reaped ids.
    pub fn reap_expired(&self) -> Vec<TransactionId> {
        let now = Timestamp::now();
        let expired: Vec<TransactionId> = self
            .slots
            .iter()
            .filter(|entry| {
                let slot = entry.value().lock();
                now >= slot.last_used.saturating_add(self.config.transaction_timeout)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = Vec::new();
        for txn_id in expired {
            match self.rollback(txn_id) {
                Ok(()) => {
                    tracing::warn!(%txn_id, "rolled back expired transaction");
                    reaped.push(txn_id);
                }
                // Lost the race to a regular commit/rollback; nothing to do.
                Err(e) => {
                    tracing::debug!(%txn_id, "expired transaction already resolved: {}", e);
                }
            }
        }
        reaped
    }

    /// Spawn the background reaper task.
    pub fn start_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.config.reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                registry.reap_expired();
            }
        })
    }

    /// Isolation/workload options a transaction was begun with.
    pub fn options(&self, txn_id: TransactionId) -> Result<ExecuteOptions> {
        let slot = self
            .slots
            .get(&txn_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| unknown(txn_id))?;
        let guard = slot.lock();
        if guard.resolved {
            return Err(unknown(txn_id));
        }
        Ok(guard.options.clone())
    }
}

fn unknown(txn_id: TransactionId) -> Error {
    Error::NotFound(format!("transaction {} not found", txn_id))
}
