//! The tablet service
//!
//! Wires the transaction registry, the 2PC coordinator, the message
//! engine, and the streaming machinery behind the protocol surface. Every
//! call passes the serving gate first (health streaming excepted, so a
//! drained tablet still reports its state), then runs its engine work on
//! the blocking pool: a blocking section runs to completion once entered,
//! which is what keeps a caller-side deadline from ever observing a
//! half-applied commit.

use crate::config::TabletConfig;
use crate::splitquery;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tablet_common::{
    BoundQuery, Dtid, Error, ExecuteOptions, HealthSnapshot, MessageRow, Participant, Position,
    QueryResult, QuerySplit, Result, StreamEvent, TransactionId, TransactionMetadata, VEvent,
    VPosition,
};
use tablet_messenger::MessengerEngine;
use tablet_protocol::QueryService;
use tablet_stream::{ChangeSource, HealthStreamer, Subscription, forward_events, spawn_producer};
use tablet_twopc::TwoPhaseCoordinator;
use tablet_txpool::{QueryEngine, Registry};
use tokio::task::JoinHandle;

/// One shard's query/transaction surface.
pub struct TabletService {
    config: TabletConfig,
    registry: Arc<Registry>,
    coordinator: Arc<TwoPhaseCoordinator>,
    messenger: Arc<MessengerEngine>,
    health: Arc<HealthStreamer>,
    changes: Arc<dyn ChangeSource>,
    serving: AtomicBool,
}

impl TabletService {
    /// Assemble a tablet over its two external collaborators. Recovers
    /// prepared transactions from the durable log before serving anything.
    pub fn new(
        config: TabletConfig,
        engine: Arc<dyn QueryEngine>,
        changes: Arc<dyn ChangeSource>,
    ) -> Result<Self> {
        let registry = Arc::new(Registry::new(engine, config.txpool.clone()));
        let coordinator = Arc::new(TwoPhaseCoordinator::open(&config.twopc, registry.clone())?);
        let messenger = Arc::new(MessengerEngine::new(config.messenger.clone()));

        let mut snapshot = HealthSnapshot::new(config.target.clone());
        snapshot.serving = true;
        let health = Arc::new(HealthStreamer::new(snapshot, config.stream.health_interval));

        tracing::info!(
            keyspace = %config.target.keyspace,
            shard = %config.target.shard,
            "tablet service starting"
        );

        Ok(Self {
            config,
            registry,
            coordinator,
            messenger,
            health,
            changes,
            serving: AtomicBool::new(true),
        })
    }

    /// Spawn the background tasks: the transaction reaper and the steady
    /// health tick.
    pub fn start_background(&self) -> Vec<JoinHandle<()>> {
        vec![self.registry.start_reaper(), self.health.start_ticker()]
    }

    /// Flip the serving state. Broadcast to health subscribers right away.
    pub fn set_serving(&self, serving: bool, reason: Option<String>) {
        self.serving.store(serving, Ordering::SeqCst);
        self.health.update(|s| {
            s.serving = serving;
            s.error = reason.clone();
        });
        tracing::info!(serving, "serving state changed");
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    /// The message engine, for the application-write hook and tooling.
    pub fn messenger(&self) -> &Arc<MessengerEngine> {
        &self.messenger
    }

    /// Report replication lag on the next health snapshots.
    pub fn set_replication_lag(&self, seconds: u64) {
        self.health.update(|s| s.replication_lag_seconds = seconds);
    }

    fn check_serving(&self) -> Result<()> {
        if self.is_serving() {
            return Ok(());
        }
        Err(Error::Unavailable(format!(
            "tablet {}/{} is not serving",
            self.config.target.keyspace, self.config.target.shard
        )))
    }
}

/// Run sync engine work on the blocking pool. The closure runs to
/// completion even if the awaiting caller is canceled.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

impl QueryService for TabletService {
    async fn execute(
        &self,
        query: BoundQuery,
        transaction_id: Option<TransactionId>,
        _options: ExecuteOptions,
    ) -> Result<QueryResult> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || match transaction_id {
            Some(txn_id) => registry.execute_in(txn_id, &query),
            None => registry.engine().execute(&query, None),
        })
        .await
    }

    async fn execute_batch(
        &self,
        queries: Vec<BoundQuery>,
        transaction_id: Option<TransactionId>,
        _options: ExecuteOptions,
    ) -> Result<Vec<QueryResult>> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || {
            let mut results = Vec::with_capacity(queries.len());
            for query in &queries {
                let result = match transaction_id {
                    Some(txn_id) => registry.execute_in(txn_id, query)?,
                    None => registry.engine().execute(query, None)?,
                };
                results.push(result);
            }
            Ok(results)
        })
        .await
    }

    async fn begin(&self, options: ExecuteOptions) -> Result<TransactionId> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || registry.begin(&options)).await
    }

    async fn commit(&self, transaction_id: TransactionId) -> Result<()> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || registry.commit(transaction_id)).await
    }

    async fn rollback(&self, transaction_id: TransactionId) -> Result<()> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || registry.rollback(transaction_id)).await
    }

    async fn begin_execute(
        &self,
        query: BoundQuery,
        options: ExecuteOptions,
    ) -> Result<(TransactionId, Result<QueryResult>)> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || {
            let txn_id = registry.begin(&options)?;
            // The transaction is begun regardless of the query's fate; the
            // caller owns rolling it back on failure.
            let result = registry.execute_in(txn_id, &query);
            Ok((txn_id, result))
        })
        .await
    }

    async fn begin_execute_batch(
        &self,
        queries: Vec<BoundQuery>,
        options: ExecuteOptions,
    ) -> Result<(TransactionId, Result<Vec<QueryResult>>)> {
        self.check_serving()?;
        let registry = self.registry.clone();
        run_blocking(move || {
            let txn_id = registry.begin(&options)?;
            let mut results = Vec::with_capacity(queries.len());
            let mut outcome = Ok(());
            for query in &queries {
                match registry.execute_in(txn_id, query) {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            Ok((txn_id, outcome.map(|()| results)))
        })
        .await
    }

    async fn prepare(&self, transaction_id: TransactionId, dtid: Dtid) -> Result<String> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.prepare(transaction_id, &dtid)).await
    }

    async fn commit_prepared(&self, dtid: Dtid) -> Result<()> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.commit_prepared(dtid.as_str())).await
    }

    async fn rollback_prepared(
        &self,
        dtid: Dtid,
        transaction_id: Option<TransactionId>,
    ) -> Result<()> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        let registry = self.registry.clone();
        run_blocking(move || {
            coordinator.rollback_prepared(dtid.as_str())?;
            // A caller that never reached Prepare may still hold a live
            // transaction under this dtid; discard it too.
            if let Some(txn_id) = transaction_id {
                match registry.rollback(txn_id) {
                    Ok(()) | Err(Error::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
        .await
    }

    async fn create_transaction(&self, dtid: Dtid, participants: Vec<Participant>) -> Result<()> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.create_transaction(&dtid, participants)).await
    }

    async fn start_commit(&self, transaction_id: TransactionId, dtid: Dtid) -> Result<()> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.start_commit(&dtid, transaction_id)).await
    }

    async fn set_rollback(&self, transaction_id: TransactionId, dtid: Dtid) -> Result<()> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.set_rollback(&dtid, transaction_id)).await
    }

    async fn conclude_transaction(&self, dtid: Dtid) -> Result<()> {
        self.check_serving()?;
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.conclude_transaction(&dtid)).await
    }

    async fn read_transaction(&self, dtid: Dtid) -> Result<TransactionMetadata> {
        // Deliberately not gated on serving: recovery tooling reads
        // transaction state while a tablet is drained.
        let coordinator = self.coordinator.clone();
        run_blocking(move || coordinator.read_transaction(&dtid)).await
    }

    async fn message_ack(&self, table: String, ids: Vec<String>) -> Result<u64> {
        self.check_serving()?;
        self.messenger.ack(&table, &ids)
    }

    async fn split_query(&self, query: BoundQuery, split_count: u32) -> Result<Vec<QuerySplit>> {
        self.check_serving()?;
        let engine = Arc::clone(self.registry.engine());
        run_blocking(move || splitquery::split(engine.as_ref(), &query, split_count)).await
    }

    async fn stream_execute(
        &self,
        query: BoundQuery,
        _options: ExecuteOptions,
    ) -> Result<Subscription<QueryResult>> {
        self.check_serving()?;
        let engine = Arc::clone(self.registry.engine());
        let batch_size = self.config.stream.batch_size;

        Ok(spawn_producer(self.config.stream.buffer, move |tx| async move {
            // Field metadata always leads; rows never arrive before schema.
            let fields = {
                let engine = Arc::clone(&engine);
                let query = query.clone();
                run_blocking(move || engine.fields_for(&query)).await?
            };
            tx.send(QueryResult::fields_only(fields)).await?;

            let sink_tx = tx.clone();
            run_blocking(move || {
                engine.stream_execute(&query, batch_size, &mut |batch| {
                    // Blocks for backpressure; fails with Canceled once the
                    // subscriber is gone, which stops the engine scan.
                    sink_tx.blocking_send(batch)
                })
            })
            .await
        }))
    }

    async fn message_stream(&self, table: String) -> Result<Subscription<MessageRow>> {
        self.check_serving()?;
        Ok(self.messenger.subscribe(&table))
    }

    async fn stream_health(&self) -> Result<Subscription<HealthSnapshot>> {
        // Health streams while not serving; that is the point of them.
        Ok(self.health.subscribe())
    }

    async fn update_stream(&self, position: Option<Position>) -> Result<Subscription<StreamEvent>> {
        self.check_serving()?;
        let source = self.changes.subscribe_updates(position)?;
        Ok(forward_events(source, self.config.stream.buffer))
    }

    async fn vstream(&self, position: Option<VPosition>) -> Result<Subscription<VEvent>> {
        self.check_serving()?;
        let source = self.changes.subscribe_vstream(position)?;
        Ok(forward_events(source, self.config.stream.buffer))
    }
}
