//! In-memory collaborators for the tablet service
//!
//! Real deployments plug a SQL storage engine and a replication-fed
//! change log into the service's seams. This crate provides in-memory
//! stand-ins with the same contracts, used by integration tests and
//! demos.

mod changelog;
mod memory;

pub use changelog::MemoryChangeLog;
pub use memory::MemoryEngine;
