//! Protocol surface of the tablet query service
//!
//! This crate defines the logical request/response contract of every call
//! the tablet serves, independent of any wire format: closed enums for
//! unary and streaming requests, their response shapes, the `QueryService`
//! trait, and the dispatch table mapping one onto the other. On-wire byte
//! layout belongs to whatever transport binds to this surface.

pub mod messages;
pub mod responses;
pub mod service;

pub use messages::{Request, StreamRequest};
pub use responses::{Response, StreamItem};
pub use service::{QueryService, dispatch, dispatch_deadline, dispatch_stream};
