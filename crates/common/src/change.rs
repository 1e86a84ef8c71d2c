//! Change events and resumable positions
//!
//! Two change-streaming surfaces exist side by side: the legacy update
//! stream (binlog-offset positions, statement-shaped events) and the
//! modern vstream (GTID positions, row-shaped events). They overlap in
//! purpose but stay separate end to end; callers pick one deliberately and
//! nothing bridges one into the other.

use crate::{Timestamp, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resumable position token in the legacy update stream. Opaque to
/// callers; totally ordered by the change source that minted it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position(String);

impl Position {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One event on the legacy update stream. Carries the position to resume
/// from, so a disconnected subscriber can continue without gap or
/// duplication beyond this event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub position: Position,
    /// The statements applied at this position.
    pub statements: Vec<String>,
    pub timestamp: Timestamp,
}

/// Resumable GTID-style position token in the vstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VPosition(String);

impl VPosition {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a vstream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VEventKind {
    Begin,
    Row,
    Ddl,
    Commit,
    Heartbeat,
}

/// One event on the vstream. Every event carries its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VEvent {
    pub position: VPosition,
    pub kind: VEventKind,
    /// Row image or DDL text, depending on `kind`. Absent for
    /// begin/commit/heartbeat markers.
    pub payload: Option<Value>,
    pub timestamp: Timestamp,
}
