//! The query service contract and its dispatch table
//!
//! `QueryService` has one method per RPC; `dispatch`/`dispatch_stream`
//! are the single explicit match from request variant to method. A
//! transport binding deserializes into `Request`/`StreamRequest`, calls
//! dispatch, and serializes whatever comes back; no other layer matches
//! over the call surface.

use crate::messages::{Request, StreamRequest};
use crate::responses::{Response, StreamItem};
use std::time::Duration;
use tablet_common::{
    BoundQuery, Dtid, Error, ExecuteOptions, HealthSnapshot, MessageRow, Participant, Position,
    QueryResult, QuerySplit, Result, StreamEvent, TransactionId, TransactionMetadata, VEvent,
    VPosition,
};
use tablet_stream::Subscription;

/// The per-tablet query service.
///
/// Every method honors caller cancellation: dropping the returned future
/// between engine operations leaves transaction state consistent, and
/// canceling a subscription terminates its producer without touching
/// sibling streams or transactions.
#[allow(async_fn_in_trait)]
pub trait QueryService {
    // === Query execution ===

    async fn execute(
        &self,
        query: BoundQuery,
        transaction_id: Option<TransactionId>,
        options: ExecuteOptions,
    ) -> Result<QueryResult>;

    async fn execute_batch(
        &self,
        queries: Vec<BoundQuery>,
        transaction_id: Option<TransactionId>,
        options: ExecuteOptions,
    ) -> Result<Vec<QueryResult>>;

    // === Transactions ===

    async fn begin(&self, options: ExecuteOptions) -> Result<TransactionId>;

    async fn commit(&self, transaction_id: TransactionId) -> Result<()>;

    async fn rollback(&self, transaction_id: TransactionId) -> Result<()>;

    /// Begin plus one execute in a single round trip. The returned id is
    /// always valid once `begin` succeeded; the embedded query's outcome
    /// travels separately so a failed query never orphans the transaction.
    async fn begin_execute(
        &self,
        query: BoundQuery,
        options: ExecuteOptions,
    ) -> Result<(TransactionId, Result<QueryResult>)>;

    async fn begin_execute_batch(
        &self,
        queries: Vec<BoundQuery>,
        options: ExecuteOptions,
    ) -> Result<(TransactionId, Result<Vec<QueryResult>>)>;

    // === Two-phase commit ===

    async fn prepare(&self, transaction_id: TransactionId, dtid: Dtid) -> Result<String>;

    async fn commit_prepared(&self, dtid: Dtid) -> Result<()>;

    async fn rollback_prepared(
        &self,
        dtid: Dtid,
        transaction_id: Option<TransactionId>,
    ) -> Result<()>;

    async fn create_transaction(&self, dtid: Dtid, participants: Vec<Participant>) -> Result<()>;

    async fn start_commit(&self, transaction_id: TransactionId, dtid: Dtid) -> Result<()>;

    async fn set_rollback(&self, transaction_id: TransactionId, dtid: Dtid) -> Result<()>;

    async fn conclude_transaction(&self, dtid: Dtid) -> Result<()>;

    async fn read_transaction(&self, dtid: Dtid) -> Result<TransactionMetadata>;

    // === Messaging ===

    async fn message_ack(&self, table: String, ids: Vec<String>) -> Result<u64>;

    // === Query splitting ===

    async fn split_query(&self, query: BoundQuery, split_count: u32) -> Result<Vec<QuerySplit>>;

    // === Streaming ===

    async fn stream_execute(
        &self,
        query: BoundQuery,
        options: ExecuteOptions,
    ) -> Result<Subscription<QueryResult>>;

    async fn message_stream(&self, table: String) -> Result<Subscription<MessageRow>>;

    async fn stream_health(&self) -> Result<Subscription<HealthSnapshot>>;

    async fn update_stream(&self, position: Option<Position>) -> Result<Subscription<StreamEvent>>;

    async fn vstream(&self, position: Option<VPosition>) -> Result<Subscription<VEvent>>;
}

/// Route a unary request to its service method.
pub async fn dispatch<S: QueryService>(service: &S, request: Request) -> Result<Response> {
    match request {
        Request::Execute {
            query,
            transaction_id,
            options,
        } => service
            .execute(query, transaction_id, options)
            .await
            .map(Response::Execute),
        Request::ExecuteBatch {
            queries,
            transaction_id,
            options,
        } => service
            .execute_batch(queries, transaction_id, options)
            .await
            .map(Response::ExecuteBatch),
        Request::Begin { options } => service
            .begin(options)
            .await
            .map(|transaction_id| Response::Begin { transaction_id }),
        Request::Commit { transaction_id } => {
            service.commit(transaction_id).await.map(|()| Response::Commit)
        }
        Request::Rollback { transaction_id } => service
            .rollback(transaction_id)
            .await
            .map(|()| Response::Rollback),
        Request::Prepare {
            transaction_id,
            dtid,
        } => service
            .prepare(transaction_id, dtid)
            .await
            .map(|prepared_name| Response::Prepare { prepared_name }),
        Request::CommitPrepared { dtid } => service
            .commit_prepared(dtid)
            .await
            .map(|()| Response::CommitPrepared),
        Request::RollbackPrepared {
            dtid,
            transaction_id,
        } => service
            .rollback_prepared(dtid, transaction_id)
            .await
            .map(|()| Response::RollbackPrepared),
        Request::CreateTransaction { dtid, participants } => service
            .create_transaction(dtid, participants)
            .await
            .map(|()| Response::CreateTransaction),
        Request::StartCommit {
            transaction_id,
            dtid,
        } => service
            .start_commit(transaction_id, dtid)
            .await
            .map(|()| Response::StartCommit),
        Request::SetRollback {
            transaction_id,
            dtid,
        } => service
            .set_rollback(transaction_id, dtid)
            .await
            .map(|()| Response::SetRollback),
        Request::ConcludeTransaction { dtid } => service
            .conclude_transaction(dtid)
            .await
            .map(|()| Response::ConcludeTransaction),
        Request::ReadTransaction { dtid } => service
            .read_transaction(dtid)
            .await
            .map(Response::ReadTransaction),
        Request::BeginExecute { query, options } => service
            .begin_execute(query, options)
            .await
            .map(|(transaction_id, result)| Response::BeginExecute {
                transaction_id,
                result,
            }),
        Request::BeginExecuteBatch { queries, options } => service
            .begin_execute_batch(queries, options)
            .await
            .map(|(transaction_id, results)| Response::BeginExecuteBatch {
                transaction_id,
                results,
            }),
        Request::MessageAck { table, ids } => service
            .message_ack(table, ids)
            .await
            .map(|count| Response::MessageAck { count }),
        Request::SplitQuery { query, split_count } => service
            .split_query(query, split_count)
            .await
            .map(Response::SplitQuery),
    }
}

/// Route a unary request with a caller deadline. Expiry surfaces as
/// `Canceled`; in-flight engine work runs to completion on its own, so
/// the observable state is never half-mutated.
pub async fn dispatch_deadline<S: QueryService>(
    service: &S,
    request: Request,
    deadline: Duration,
) -> Result<Response> {
    let name = request.name();
    match tokio::time::timeout(deadline, dispatch(service, request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Canceled(format!("{} deadline exceeded", name))),
    }
}

/// Route a server-streaming request to its service method, unifying the
/// item type for the transport.
pub async fn dispatch_stream<S: QueryService>(
    service: &S,
    request: StreamRequest,
) -> Result<Subscription<StreamItem>> {
    match request {
        StreamRequest::StreamExecute { query, options } => Ok(service
            .stream_execute(query, options)
            .await?
            .map(StreamItem::Rows)),
        StreamRequest::MessageStream { table } => Ok(service
            .message_stream(table)
            .await?
            .map(StreamItem::Message)),
        StreamRequest::StreamHealth => {
            Ok(service.stream_health().await?.map(StreamItem::Health))
        }
        StreamRequest::UpdateStream { position } => Ok(service
            .update_stream(position)
            .await?
            .map(StreamItem::Update)),
        StreamRequest::VStream { position } => {
            Ok(service.vstream(position).await?.map(StreamItem::VEvent))
        }
    }
}
