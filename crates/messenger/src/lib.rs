//! Message-queue delivery for the tablet
//!
//! Message tables are durable queues written by the application as
//! ordinary rows. This crate owns the delivery side: streaming rows to
//! subscribers in enqueue order, at-least-once with ack-driven
//! retirement, lease-based redelivery, and poisoning after a bounded
//! number of attempts. There is no cross-table ordering; each table is an
//! independent queue.

mod config;
mod engine;
mod manager;

pub use config::MessengerConfig;
pub use engine::MessengerEngine;
pub use manager::MessageManager;
