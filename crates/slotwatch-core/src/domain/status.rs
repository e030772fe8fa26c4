//! Scheduler lifecycle state and the queryable status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ErrorKind;

/// Lifecycle of the monitoring scheduler.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Starting => "starting",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of the monitor, safe to hand to a health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoringStatus {
    pub state: SchedulerState,
    pub is_running: bool,
    pub last_check_time: Option<DateTime<Utc>>,

    /// Configured check interval in seconds.
    pub interval_secs: u64,

    /// Interval currently in effect (wider than `interval_secs` while escalated).
    pub effective_interval_secs: u64,

    pub target_zones: Vec<String>,

    /// `YYYY-MM-DD ~ YYYY-MM-DD`
    pub search_period: String,

    pub total_checks: u64,
    pub consecutive_errors: u32,

    /// Distinct identities notified during this process lifetime.
    pub notified_count: usize,

    pub last_attempts: u32,
    pub last_error: Option<ErrorKind>,
}

impl MonitoringStatus {
    pub fn is_escalated(&self) -> bool {
        self.effective_interval_secs > self.interval_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_stopped() {
        assert_eq!(SchedulerState::default(), SchedulerState::Stopped);
        assert_eq!(SchedulerState::Running.to_string(), "running");
    }

    #[test]
    fn test_status_serializes() {
        let status = MonitoringStatus {
            state: SchedulerState::Running,
            is_running: true,
            last_check_time: None,
            interval_secs: 300,
            effective_interval_secs: 600,
            target_zones: vec!["C ZONE".to_string()],
            search_period: "2025-09-08 ~ 2025-09-09".to_string(),
            total_checks: 4,
            consecutive_errors: 1,
            notified_count: 2,
            last_attempts: 3,
            last_error: Some(ErrorKind::Inconclusive),
        };
        assert!(status.is_escalated());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["last_error"], "inconclusive");
    }
}
