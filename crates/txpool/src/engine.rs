//! Storage engine seam
//!
//! The SQL execution engine and the storage under it are external
//! collaborators. This trait is the whole surface the tablet needs from
//! them: run a query (possibly inside a transaction), control transaction
//! boundaries, and answer the two metadata questions streaming and query
//! splitting ask.
//!
//! All methods are synchronous. Callers that need async wrap them in a
//! blocking task; a method runs to completion once entered, which is what
//! keeps cancellation from ever observing a half-applied mutation.

use tablet_common::{BoundQuery, ExecuteOptions, Field, QueryResult, Result, TransactionId};

/// The storage engine behind the tablet.
pub trait QueryEngine: Send + Sync + 'static {
    /// Open a transaction under the given id.
    fn begin(&self, txn_id: TransactionId, options: &ExecuteOptions) -> Result<()>;

    /// Run one query, inside `txn_id` if given.
    fn execute(&self, query: &BoundQuery, txn_id: Option<TransactionId>) -> Result<QueryResult>;

    /// Durably apply everything executed under `txn_id` and release it.
    fn commit(&self, txn_id: TransactionId) -> Result<()>;

    /// Discard everything executed under `txn_id` and release it.
    fn rollback(&self, txn_id: TransactionId) -> Result<()>;

    /// Column metadata for a query's result set, without running it.
    fn fields_for(&self, query: &BoundQuery) -> Result<Vec<Field>>;

    /// Run a query and hand its rows to `sink` in batches of up to
    /// `batch_size` rows. A sink error stops the scan and is returned
    /// as-is, which is how subscriber cancellation reaches the engine.
    fn stream_execute(
        &self,
        query: &BoundQuery,
        batch_size: usize,
        sink: &mut dyn FnMut(QueryResult) -> Result<()>,
    ) -> Result<()>;

    /// Minimum and maximum of the split column over the query's row set.
    fn column_range(&self, query: &BoundQuery) -> Result<(i64, i64)>;
}
