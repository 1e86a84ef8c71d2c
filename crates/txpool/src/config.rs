//! Registry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the transaction registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxPoolConfig {
    /// Maximum number of concurrently open transactions.
    pub capacity: usize,

    /// Transactions idle longer than this are rolled back by the reaper.
    pub transaction_timeout: Duration,

    /// How often the reaper scans for expired transactions.
    pub reap_interval: Duration,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            transaction_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(1),
        }
    }
}
