//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tablet_common::Target;
use tablet_messenger::MessengerConfig;
use tablet_twopc::TwoPcConfig;
use tablet_txpool::TxPoolConfig;

/// Streaming tunables shared by all server-streaming calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Per-subscription buffer, in items. The bound is the backpressure.
    pub buffer: usize,

    /// Rows per packet on streamed results.
    pub batch_size: usize,

    /// Steady health-tick interval between state changes.
    pub health_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer: 16,
            batch_size: 256,
            health_interval: Duration::from_secs(20),
        }
    }
}

/// Top-level configuration of one tablet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabletConfig {
    /// The (keyspace, shard, tablet type) this tablet serves.
    pub target: Target,
    pub txpool: TxPoolConfig,
    pub twopc: TwoPcConfig,
    pub messenger: MessengerConfig,
    pub stream: StreamConfig,
}

impl TabletConfig {
    /// Defaults for everything but the identity and the durable-log
    /// location, which have no sensible defaults.
    pub fn new(target: Target, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            target,
            txpool: TxPoolConfig::default(),
            twopc: TwoPcConfig::new(data_dir),
            messenger: MessengerConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}
