//! The per-tablet query service
//!
//! Assembles the transaction registry, the 2PC coordinator, the message
//! engine, health broadcasting and change streaming into one
//! [`TabletService`] implementing the full protocol surface. The two
//! external collaborators, the storage engine and the change-event
//! source, are injected at construction.

mod config;
mod service;
pub mod splitquery;

pub use config::{StreamConfig, TabletConfig};
pub use service::TabletService;
