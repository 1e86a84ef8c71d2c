//! Physical timestamps in microseconds since the Unix epoch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Physical timestamp with microsecond precision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self(micros)
    }

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// This timestamp shifted forward by `d`.
    pub fn saturating_add(&self, d: Duration) -> Self {
        Self(self.0.saturating_add(d.as_micros() as u64))
    }

    /// Elapsed time between `earlier` and `self`, zero if `earlier` is later.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Parse from the decimal microsecond representation.
    pub fn parse(s: &str) -> Result<Self, String> {
        s.parse()
            .map(Self)
            .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let a = Timestamp::from_micros(100);
        let b = a.saturating_add(Duration::from_micros(50));
        assert!(a < b);
        assert_eq!(b.saturating_since(a), Duration::from_micros(50));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn test_parse_roundtrip() {
        let ts = Timestamp::now();
        assert_eq!(Timestamp::parse(&ts.to_string()).unwrap(), ts);
    }
}
