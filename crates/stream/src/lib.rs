//! Shared machinery for server-streaming calls
//!
//! Every long-lived streaming call on the tablet (result streaming, message
//! delivery, health ticks, change events) is a producer task feeding a
//! bounded channel. This crate provides that plumbing once:
//!
//! - Bounded subscriptions with backpressure and cancellation
//! - The termination contract (clean close vs terminal error)
//! - Latest-wins health broadcasting
//! - The change-event source seam and its forwarding pump
//!
//! Components own their producers; the transport layer only ever sees a
//! `Subscription`.

pub mod change;
pub mod health;
pub mod subscription;

pub use change::{ChangeSource, forward_events};
pub use health::HealthStreamer;
pub use subscription::{
    StreamPermit, StreamSender, Subscription, TrySendError, channel, spawn_producer,
};
