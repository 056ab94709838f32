//! Engine runtime options. Markets, fees and authorities live in `ExchangeConfig`.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Events retained in memory, oldest dropped first
    pub max_events: usize,
    /// Clock value the engine starts at. The host advances it explicitly.
    pub start_time: Timestamp,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            start_time: Timestamp::from_millis(0),
        }
    }
}
