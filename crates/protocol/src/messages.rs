//! Request types
//!
//! One closed enum per transport shape: `Request` for unary calls,
//! `StreamRequest` for server-streaming calls. Each RPC of the query
//! service is exactly one variant; the dispatch table in
//! `crate::service` is the only place that matches over them.

use tablet_common::{
    BoundQuery, Dtid, ExecuteOptions, Participant, Position, TransactionId, VPosition,
};

/// A unary call to the query service.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Run one query, inside a transaction if `transaction_id` is set.
    Execute {
        query: BoundQuery,
        transaction_id: Option<TransactionId>,
        options: ExecuteOptions,
    },
    /// Run a list of queries, returning one result per query.
    ExecuteBatch {
        queries: Vec<BoundQuery>,
        transaction_id: Option<TransactionId>,
        options: ExecuteOptions,
    },
    /// Open a transaction.
    Begin { options: ExecuteOptions },
    /// Durably apply a transaction's writes.
    Commit { transaction_id: TransactionId },
    /// Discard a transaction's writes.
    Rollback { transaction_id: TransactionId },
    /// Convert a live transaction into a durable prepared transaction
    /// named after its dtid.
    Prepare {
        transaction_id: TransactionId,
        dtid: Dtid,
    },
    /// Resolve a prepared transaction as committed.
    CommitPrepared { dtid: Dtid },
    /// Resolve a prepared transaction as rolled back.
    RollbackPrepared {
        dtid: Dtid,
        /// The original local transaction, when the caller still knows it.
        transaction_id: Option<TransactionId>,
    },
    /// Create the durable metadata record for a distributed transaction.
    CreateTransaction {
        dtid: Dtid,
        participants: Vec<Participant>,
    },
    /// Decide COMMIT for a distributed transaction and commit the local
    /// prepared participant.
    StartCommit {
        transaction_id: TransactionId,
        dtid: Dtid,
    },
    /// Decide ROLLBACK for a distributed transaction and roll back the
    /// local participant.
    SetRollback {
        transaction_id: TransactionId,
        dtid: Dtid,
    },
    /// Erase a resolved distributed transaction's bookkeeping.
    ConcludeTransaction { dtid: Dtid },
    /// Read a distributed transaction's state and participants.
    ReadTransaction { dtid: Dtid },
    /// Begin plus one query in a single round trip.
    BeginExecute {
        query: BoundQuery,
        options: ExecuteOptions,
    },
    /// Begin plus a list of queries in a single round trip.
    BeginExecuteBatch {
        queries: Vec<BoundQuery>,
        options: ExecuteOptions,
    },
    /// Ack delivered message rows.
    MessageAck { table: String, ids: Vec<String> },
    /// Split a query into parallelizable sub-queries.
    SplitQuery {
        query: BoundQuery,
        split_count: u32,
    },
}

/// A server-streaming call to the query service.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest {
    /// Stream a large result: first fields, then row batches.
    StreamExecute {
        query: BoundQuery,
        options: ExecuteOptions,
    },
    /// Stream pending rows of a message table.
    MessageStream { table: String },
    /// Stream health snapshots.
    StreamHealth,
    /// Stream change events, legacy flavor. Resumes after `position`.
    UpdateStream { position: Option<Position> },
    /// Stream change events, vstream flavor. Resumes after `position`.
    VStream { position: Option<VPosition> },
}

impl Request {
    /// RPC name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Execute { .. } => "Execute",
            Request::ExecuteBatch { .. } => "ExecuteBatch",
            Request::Begin { .. } => "Begin",
            Request::Commit { .. } => "Commit",
            Request::Rollback { .. } => "Rollback",
            Request::Prepare { .. } => "Prepare",
            Request::CommitPrepared { .. } => "CommitPrepared",
            Request::RollbackPrepared { .. } => "RollbackPrepared",
            Request::CreateTransaction { .. } => "CreateTransaction",
            Request::StartCommit { .. } => "StartCommit",
            Request::SetRollback { .. } => "SetRollback",
            Request::ConcludeTransaction { .. } => "ConcludeTransaction",
            Request::ReadTransaction { .. } => "ReadTransaction",
            Request::BeginExecute { .. } => "BeginExecute",
            Request::BeginExecuteBatch { .. } => "BeginExecuteBatch",
            Request::MessageAck { .. } => "MessageAck",
            Request::SplitQuery { .. } => "SplitQuery",
        }
    }
}

impl StreamRequest {
    /// RPC name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            StreamRequest::StreamExecute { .. } => "StreamExecute",
            StreamRequest::MessageStream { .. } => "MessageStream",
            StreamRequest::StreamHealth => "StreamHealth",
            StreamRequest::UpdateStream { .. } => "UpdateStream",
            StreamRequest::VStream { .. } => "VStream",
        }
    }
}
