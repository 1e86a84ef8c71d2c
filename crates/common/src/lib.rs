//! Common types for the tablet query service
//!
//! This crate defines:
//! - Transaction and distributed-transaction identifiers
//! - Physical timestamps (microseconds since Unix epoch)
//! - The opaque query/result model handed to the storage engine
//! - Message rows, health snapshots, and change events
//! - The canonical error taxonomy shared by every crate

mod change;
mod dtid;
mod error;
mod health;
mod message;
mod query;
mod timestamp;
mod transaction_id;

pub use change::{Position, StreamEvent, VEvent, VEventKind, VPosition};
pub use dtid::{Dtid, DtidState, Participant, TransactionMetadata};
pub use error::{Error, ErrorCode, Result};
pub use health::{HealthSnapshot, TabletType, Target};
pub use message::MessageRow;
pub use query::{
    BoundQuery, ColumnType, ExecuteOptions, Field, IsolationLevel, KeyRange, QueryResult,
    QuerySplit, Value, Workload,
};
pub use timestamp::Timestamp;
pub use transaction_id::{TransactionId, TransactionIdGenerator};
