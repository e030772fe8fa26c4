//! Structured lifecycle events for the monitoring loop.
//!
//! - `SessionSpan`: RAII guard tagging everything logged inside a
//!   start/stop session with a generated `session_id`
//! - `emit_*`: one function per lifecycle event, logged with an `event` field

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{CycleOutcome, MonitoringStatus};

/// Span covering one monitoring session.
///
/// The span itself is `Send`; the loop task instruments its future with it
/// rather than holding an entered guard across awaits.
#[derive(Debug, Clone)]
pub struct SessionSpan {
    session_id: Uuid,
    span: tracing::Span,
}

impl SessionSpan {
    pub fn new() -> Self {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("slotwatch.session", session_id = %session_id);
        Self { session_id, span }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Enter the span on the current thread (synchronous sections only).
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Default for SessionSpan {
    fn default() -> Self {
        Self::new()
    }
}

pub fn emit_scheduler_started(session_id: Uuid, interval: Duration, strategies: &[&str]) {
    info!(
        event = "scheduler.started",
        session_id = %session_id,
        interval_secs = interval.as_secs(),
        strategies = %strategies.join(","),
    );
}

pub fn emit_scheduler_stopped(session_id: Uuid, reason: &str, total_checks: u64) {
    info!(
        event = "scheduler.stopped",
        session_id = %session_id,
        reason = %reason,
        total_checks = total_checks,
    );
}

/// Emit event: one cycle completed, successful or not.
pub fn emit_cycle_finished(outcome: &CycleOutcome) {
    match outcome.error {
        Some(kind) => warn!(
            event = "cycle.finished",
            cycle = outcome.cycle,
            found = outcome.items.len(),
            new = outcome.new_items.len(),
            attempts = outcome.attempts,
            failed_attempts = outcome.failed_attempts,
            duration_ms = outcome.duration_ms,
            error = %kind,
        ),
        None => info!(
            event = "cycle.finished",
            cycle = outcome.cycle,
            found = outcome.items.len(),
            new = outcome.new_items.len(),
            attempts = outcome.attempts,
            notified = outcome.notified,
            duration_ms = outcome.duration_ms,
        ),
    }
}

pub fn emit_escalation_triggered(from: Duration, to: Duration) {
    warn!(
        event = "escalation.triggered",
        from_secs = from.as_secs(),
        to_secs = to.as_secs(),
    );
}

pub fn emit_escalation_recovered(from: Duration, to: Duration) {
    info!(
        event = "escalation.recovered",
        from_secs = from.as_secs(),
        to_secs = to.as_secs(),
    );
}

/// Emit event: periodic status report from the daemon.
pub fn emit_status_report(status: &MonitoringStatus) {
    info!(
        event = "status.report",
        state = %status.state,
        total_checks = status.total_checks,
        consecutive_errors = status.consecutive_errors,
        notified_count = status.notified_count,
        effective_interval_secs = status.effective_interval_secs,
    );
}
