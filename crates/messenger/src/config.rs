//! Queue manager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for message delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// How long a delivered row stays leased to its subscriber before it
    /// becomes eligible for redelivery.
    pub ack_wait: Duration,

    /// Rows delivered this many times without an ack are poisoned and
    /// excluded from further delivery.
    pub max_delivery_count: u32,

    /// How often the pump scans for due rows and expired leases.
    pub poll_interval: Duration,

    /// Per-subscriber stream buffer, in rows.
    pub stream_buffer: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_secs(30),
            max_delivery_count: 3,
            poll_interval: Duration::from_millis(100),
            stream_buffer: 64,
        }
    }
}
