//! Two-phase-commit coordination for the tablet
//!
//! Owns the durable side of distributed transactions: the dtid state
//! machine, the prepared-transaction pool, and the crash-recovery path
//! that lets a background resolver finish what a failed coordinator
//! started. All durability writes are synced before any call returns.

mod config;
mod coordinator;
mod log;

pub use config::TwoPcConfig;
pub use coordinator::TwoPhaseCoordinator;
pub use log::{CoordinatorLog, DtidRecord, PreparedRecord};
