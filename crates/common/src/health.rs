//! Tablet health snapshots
//!
//! A snapshot is a point-in-time value object with no persisted identity.
//! Subscribers always want the latest one; stale snapshots are worthless
//! and are dropped rather than queued.

use serde::{Deserialize, Serialize};

/// Role this tablet serves within its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabletType {
    Primary,
    Replica,
    Rdonly,
}

/// The (keyspace, shard, tablet type) coordinate a router targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
}

impl Target {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>, tablet_type: TabletType) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            tablet_type,
        }
    }
}

/// Point-in-time health of a tablet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub target: Target,
    /// Whether the tablet currently accepts queries.
    pub serving: bool,
    /// Replication lag behind the primary, in seconds. Zero on a primary.
    pub replication_lag_seconds: u64,
    /// Last health-check error, if the tablet is degraded.
    pub error: Option<String>,
}

impl HealthSnapshot {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            serving: false,
            replication_lag_seconds: 0,
            error: None,
        }
    }
}
