//! Response types
//!
//! `Response` mirrors `Request` variant for variant; `StreamItem` is the
//! one item type flowing on every server-streaming subscription.

use tablet_common::{
    HealthSnapshot, MessageRow, QueryResult, QuerySplit, Result, StreamEvent, TransactionId,
    TransactionMetadata, VEvent,
};

/// Reply to a unary call.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Execute(QueryResult),
    ExecuteBatch(Vec<QueryResult>),
    Begin {
        transaction_id: TransactionId,
    },
    Commit,
    Rollback,
    Prepare {
        /// The dtid-derived name `CommitPrepared`/`RollbackPrepared` use.
        prepared_name: String,
    },
    CommitPrepared,
    RollbackPrepared,
    CreateTransaction,
    StartCommit,
    SetRollback,
    ConcludeTransaction,
    ReadTransaction(TransactionMetadata),
    /// The transaction id is always populated once `Begin` itself
    /// succeeded, even when the embedded query failed; the caller owns
    /// deciding what to do with the open transaction.
    BeginExecute {
        transaction_id: TransactionId,
        result: Result<QueryResult>,
    },
    BeginExecuteBatch {
        transaction_id: TransactionId,
        results: Result<Vec<QueryResult>>,
    },
    MessageAck {
        /// Rows actually retired by this call; skipped ids are excluded.
        count: u64,
    },
    SplitQuery(Vec<QuerySplit>),
}

/// One item on a server-streaming call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A result packet: fields first, then row batches.
    Rows(QueryResult),
    /// A delivered message row.
    Message(MessageRow),
    /// A health snapshot.
    Health(HealthSnapshot),
    /// A legacy change event.
    Update(StreamEvent),
    /// A vstream change event.
    VEvent(VEvent),
}
