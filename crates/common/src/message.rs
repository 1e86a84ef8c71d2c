//! Message-table rows
//!
//! A message table is a durable queue stored as ordinary rows. The queue
//! manager delivers them to streaming subscribers and retires them on ack.

use crate::{Timestamp, Value};
use serde::{Deserialize, Serialize};

/// One row of a message table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Unique id within the table; acks reference this.
    pub id: String,
    /// Application payload, opaque to the queue manager.
    pub payload: Value,
    /// Enqueue time. Primary delivery ordering key.
    pub time_created: Timestamp,
    /// Priority tier; lower epochs deliver first among equal enqueue times.
    pub epoch: i64,
    /// Earliest time this row is eligible for (re)delivery.
    pub time_next: Timestamp,
    /// Number of times this row has been handed to a subscriber.
    pub delivery_count: u32,
}

impl MessageRow {
    /// A fresh row, eligible immediately.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        let now = Timestamp::now();
        Self {
            id: id.into(),
            payload,
            time_created: now,
            epoch: 0,
            time_next: now,
            delivery_count: 0,
        }
    }

    pub fn with_epoch(mut self, epoch: i64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_time_created(mut self, t: Timestamp) -> Self {
        self.time_created = t;
        self.time_next = t;
        self
    }
}
