//! Per-cycle result record.

use serde::{Deserialize, Serialize};

use super::error::ErrorKind;
use super::item::AvailabilityItem;

/// Result of one full check cycle.
///
/// Produced once per cycle by the scheduler. Only aggregated counters
/// survive past the cycle (see [`super::status::MonitoringStatus`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    /// Sequence number of this cycle within the session (1-based).
    pub cycle: u64,

    /// Every available item observed this cycle.
    pub items: Vec<AvailabilityItem>,

    /// The subset of `items` not notified before.
    pub new_items: Vec<AvailabilityItem>,

    /// Pipeline invocations used by the retry executor.
    pub attempts: u32,

    /// Attempts in which no strategy was conclusive.
    pub failed_attempts: u32,

    /// Whether `new_items` were delivered to the notifier.
    pub notified: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Why the cycle counts as failed, if it does.
    pub error: Option<ErrorKind>,
}

impl CycleOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn found_any(&self) -> bool {
        !self.items.is_empty()
    }
}
