//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables for the 2PC coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoPcConfig {
    /// Directory holding the durable prepared-transaction and dtid logs.
    pub data_dir: PathBuf,
}

impl TwoPcConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}
