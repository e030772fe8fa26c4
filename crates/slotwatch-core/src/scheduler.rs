//! Monitoring scheduler: lifecycle state machine and the check cycle.
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`
//!
//! Exactly one cycle runs at a time. The session state (dedup store,
//! escalation, counters) is moved into the loop task on `start` and handed
//! back through its `JoinHandle` on `stop`, so notified identities survive a
//! restart within the same process. The status snapshot is published behind
//! a lock that only the scheduler and its session write.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{error, info, warn, Instrument};

use crate::capability::{Notifier, StatusKind};
use crate::config::MonitorConfig;
use crate::dedup::DeduplicationStore;
use crate::domain::{
    CycleOutcome, ErrorKind, MonitoringStatus, Result, SchedulerState, SlotwatchError,
};
use crate::escalation::{FailureEscalation, IntervalChange};
use crate::obs::{self, SessionSpan};
use crate::pipeline::AcquisitionPipeline;
use crate::retry::RetryExecutor;
use crate::strategy::AcquisitionContext;

type SharedStatus = Arc<RwLock<MonitoringStatus>>;

fn read_status(status: &SharedStatus) -> RwLockReadGuard<'_, MonitoringStatus> {
    status.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_status(status: &SharedStatus) -> RwLockWriteGuard<'_, MonitoringStatus> {
    status.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn send_status(notifier: &dyn Notifier, kind: StatusKind, message: &str) {
    if let Err(e) = notifier.notify_status(kind, message).await {
        warn!(?kind, error = %e, "status message not delivered");
    }
}

fn minutes(d: Duration) -> u64 {
    d.as_secs() / 60
}

// ---------------------------------------------------------------------------
// CycleSession
// ---------------------------------------------------------------------------

/// State owned by whoever is running cycles.
struct CycleSession {
    ctx: AcquisitionContext,
    pipeline: Arc<AcquisitionPipeline>,
    notifier: Arc<dyn Notifier>,
    retry: RetryExecutor,
    dedup: DeduplicationStore,
    escalation: FailureEscalation,
    heartbeat_every: u64,
    total_checks: u64,
    status: SharedStatus,
}

impl CycleSession {
    fn new(
        config: &MonitorConfig,
        pipeline: Arc<AcquisitionPipeline>,
        notifier: Arc<dyn Notifier>,
        status: SharedStatus,
    ) -> Self {
        Self {
            ctx: config.acquisition_context(),
            pipeline,
            notifier,
            retry: RetryExecutor::new(config.retry.clone()),
            dedup: DeduplicationStore::new(),
            escalation: FailureEscalation::new(config.escalation.clone(), config.check_interval),
            heartbeat_every: config.heartbeat_every,
            total_checks: 0,
            status,
        }
    }

    /// One full check: acquire, dedup, notify, heartbeat, escalate, publish.
    async fn run_cycle(&mut self) -> CycleOutcome {
        let start = Instant::now();
        self.total_checks += 1;
        let cycle = self.total_checks;
        info!(cycle, "check cycle started");

        let report = self.retry.run_with_retry(&self.pipeline, &self.ctx).await;
        let new_items = self.dedup.filter_new(&report.items);

        let mut notified = false;
        let mut error = None;

        if !new_items.is_empty() {
            match self.notifier.notify(&new_items).await {
                Ok(()) => {
                    let recorded = self.dedup.record(&new_items);
                    notified = true;
                    info!(cycle, new = new_items.len(), recorded, "new availability notified");
                }
                Err(e) => {
                    // Not recorded, so the same items are offered again next cycle.
                    error!(cycle, error = %e, "failed to deliver availability notification");
                    error = Some(ErrorKind::NotifyFailure);
                }
            }
        } else if !report.items.is_empty() {
            info!(cycle, found = report.items.len(), "availability unchanged, already notified");
        }

        if error.is_none() && report.all_failed() {
            error = report.last_error;
        }

        if report.items.is_empty()
            && self.heartbeat_every > 0
            && cycle % self.heartbeat_every == 0
        {
            let message = format!(
                "Still watching: {} checks so far, nothing available in {} for {}",
                cycle,
                self.ctx.target_zones.join(", "),
                self.ctx.search.period()
            );
            send_status(self.notifier.as_ref(), StatusKind::Heartbeat, &message).await;
        }

        if error.is_some() {
            if let Some(IntervalChange::Widened { from, to }) = self.escalation.on_cycle_error() {
                obs::emit_escalation_triggered(from, to);
                let message = format!(
                    "Repeated check failures: interval widened from {} to {} minutes",
                    minutes(from),
                    minutes(to)
                );
                if let Err(e) = self.notifier.notify_error(&message).await {
                    warn!(error = %e, "escalation notice not delivered");
                }
            }
        } else if let Some(IntervalChange::Restored { from, to }) =
            self.escalation.on_cycle_success()
        {
            obs::emit_escalation_recovered(from, to);
        }

        let outcome = CycleOutcome {
            cycle,
            items: report.items,
            new_items,
            attempts: report.attempts_used,
            failed_attempts: report.failed_attempts,
            notified,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        };

        self.publish(&outcome);
        obs::emit_cycle_finished(&outcome);
        outcome
    }

    fn publish(&self, outcome: &CycleOutcome) {
        let mut status = write_status(&self.status);
        status.last_check_time = Some(Utc::now());
        status.total_checks = self.total_checks;
        status.consecutive_errors = self.escalation.consecutive_errors();
        status.effective_interval_secs = self.escalation.effective_interval().as_secs();
        status.notified_count = self.dedup.len();
        status.last_attempts = outcome.attempts;
        status.last_error = outcome.error;
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Recurring trigger. Returns the session when shutdown is signalled.
async fn run_loop(mut session: CycleSession, mut shutdown: watch::Receiver<bool>) -> CycleSession {
    let mut period = session.escalation.effective_interval();
    let mut ticker = ticker(period);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                session.run_cycle().await;
                let next = session.escalation.effective_interval();
                if next != period {
                    info!(
                        from_secs = period.as_secs(),
                        to_secs = next.as_secs(),
                        "check interval changed"
                    );
                    period = next;
                    ticker = self::ticker(period);
                }
            }
        }
    }

    session
}

// ---------------------------------------------------------------------------
// MonitoringScheduler
// ---------------------------------------------------------------------------

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<CycleSession>,
    span: SessionSpan,
}

#[derive(Default)]
struct Lifecycle {
    /// Parked session while stopped.
    session: Option<CycleSession>,
    running: Option<RunningLoop>,
}

/// Drives check cycles on a recurring trigger.
pub struct MonitoringScheduler {
    config: MonitorConfig,
    pipeline: Arc<AcquisitionPipeline>,
    notifier: Arc<dyn Notifier>,
    status: SharedStatus,
    lifecycle: Mutex<Lifecycle>,
}

impl MonitoringScheduler {
    pub fn new(
        config: MonitorConfig,
        pipeline: Arc<AcquisitionPipeline>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let status = MonitoringStatus {
            state: SchedulerState::Stopped,
            is_running: false,
            last_check_time: None,
            interval_secs: config.check_interval.as_secs(),
            effective_interval_secs: config.check_interval.as_secs(),
            target_zones: config.target_zones.clone(),
            search_period: config.search.period(),
            total_checks: 0,
            consecutive_errors: 0,
            notified_count: 0,
            last_attempts: 0,
            last_error: None,
        };

        Self {
            config,
            pipeline,
            notifier,
            status: Arc::new(RwLock::new(status)),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> MonitoringStatus {
        read_status(&self.status).clone()
    }

    pub fn state(&self) -> SchedulerState {
        read_status(&self.status).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    fn set_state(&self, state: SchedulerState) {
        let mut status = write_status(&self.status);
        status.state = state;
        status.is_running = state == SchedulerState::Running;
    }

    fn take_session(&self, lifecycle: &mut Lifecycle) -> CycleSession {
        lifecycle.session.take().unwrap_or_else(|| {
            CycleSession::new(
                &self.config,
                Arc::clone(&self.pipeline),
                Arc::clone(&self.notifier),
                Arc::clone(&self.status),
            )
        })
    }

    /// Start monitoring: validate, probe the notifier, run one cycle, then
    /// continue on the recurring trigger.
    ///
    /// A no-op (with a warning) unless the scheduler is stopped.
    pub async fn start(&self) -> Result<()> {
        let state = self.state();
        if state != SchedulerState::Stopped {
            warn!(state = %state, "start requested while not stopped, ignoring");
            return Ok(());
        }

        let mut lifecycle = self.lifecycle.lock().await;
        let state = self.state();
        if state != SchedulerState::Stopped {
            warn!(state = %state, "start requested while not stopped, ignoring");
            return Ok(());
        }

        self.set_state(SchedulerState::Starting);

        if let Err(e) = self.config.validate() {
            error!(error = %e, "refusing to start with invalid configuration");
            self.set_state(SchedulerState::Stopped);
            return Err(e);
        }

        if !self.notifier.test_reachable().await {
            error!("notifier is not reachable, refusing to start");
            self.set_state(SchedulerState::Stopped);
            return Err(SlotwatchError::NotifierUnreachable);
        }

        let span = SessionSpan::new();
        let mut session = self.take_session(&mut lifecycle);
        self.set_state(SchedulerState::Running);
        obs::emit_scheduler_started(
            span.session_id(),
            self.config.check_interval,
            &self.pipeline.strategy_names(),
        );

        let message = format!(
            "Monitoring started: {} for {}, every {} minutes",
            self.config.target_zones.join(", "),
            self.config.search.period(),
            minutes(self.config.check_interval)
        );
        send_status(self.notifier.as_ref(), StatusKind::Start, &message).await;

        session.run_cycle().instrument(span.span().clone()).await;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(session, shutdown_rx).instrument(span.span().clone()));
        lifecycle.running = Some(RunningLoop {
            shutdown,
            handle,
            span,
        });

        Ok(())
    }

    /// Stop monitoring. An in-flight cycle finishes before this returns.
    ///
    /// A no-op (with a warning) unless the scheduler is running.
    pub async fn stop(&self, reason: &str) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.running.take() else {
            warn!(state = %self.state(), reason = %reason, "stop requested while not running, ignoring");
            return;
        };

        self.set_state(SchedulerState::Stopping);
        info!(reason = %reason, "stopping monitoring");

        // The loop may already have exited; nothing to signal then.
        let _ = running.shutdown.send(true);
        let session = match running.handle.await {
            Ok(session) => Some(session),
            Err(e) => {
                error!(error = %e, "monitoring loop ended abnormally, session state lost");
                None
            }
        };

        self.pipeline.close().await;

        let total_checks = self.status().total_checks;
        send_status(
            self.notifier.as_ref(),
            StatusKind::Stop,
            &format!("Monitoring stopped ({}) after {} checks", reason, total_checks),
        )
        .await;
        obs::emit_scheduler_stopped(running.span.session_id(), reason, total_checks);

        lifecycle.session = session;
        self.set_state(SchedulerState::Stopped);
    }

    /// Run a single cycle outside the recurring trigger.
    pub async fn run_once(&self) -> Result<CycleOutcome> {
        let mut lifecycle = self.lifecycle.lock().await;
        let state = self.state();
        if state != SchedulerState::Stopped {
            return Err(SlotwatchError::InvalidState(state.to_string()));
        }
        self.config.validate()?;

        let mut session = self.take_session(&mut lifecycle);
        let outcome = session.run_cycle().await;
        lifecycle.session = Some(session);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AvailabilityItem;
    use crate::fakes::{RecordingNotifier, ScriptedStrategy};
    use crate::retry::RetryPolicy;
    use crate::strategy::{InconclusiveReason, StrategyOutcome};
    use chrono::NaiveDate;

    fn config() -> MonitorConfig {
        MonitorConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(10),
            },
            heartbeat_every: 2,
            ..MonitorConfig::default()
        }
    }

    fn item(zone: &str, name: &str) -> AvailabilityItem {
        AvailabilityItem::available(
            name,
            zone,
            NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            "scripted",
        )
    }

    fn scheduler(
        strategy: Arc<ScriptedStrategy>,
        notifier: Arc<RecordingNotifier>,
    ) -> MonitoringScheduler {
        let pipeline = AcquisitionPipeline::new(vec![strategy], Duration::from_secs(5));
        MonitoringScheduler::new(config(), Arc::new(pipeline), notifier)
    }

    #[tokio::test]
    async fn test_new_scheduler_is_stopped() {
        let scheduler = scheduler(
            Arc::new(ScriptedStrategy::new("s")),
            Arc::new(RecordingNotifier::new()),
        );
        let status = scheduler.status();
        assert_eq!(status.state, SchedulerState::Stopped);
        assert!(!status.is_running);
        assert_eq!(status.total_checks, 0);
        assert_eq!(status.interval_secs, 300);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_cycle() {
        let strategy = Arc::new(ScriptedStrategy::always("s", vec![item("C ZONE", "C존 A1")]));
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = scheduler(strategy, notifier.clone());

        notifier.set_failing(true);
        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::NotifyFailure));
        assert!(!outcome.notified);
        assert_eq!(scheduler.status().notified_count, 0);

        notifier.set_failing(false);
        let outcome = scheduler.run_once().await.unwrap();
        assert!(outcome.notified);
        assert_eq!(outcome.error, None);
        assert_eq!(notifier.delivered_count(), 1);
    }

    #[tokio::test]
    async fn test_all_failed_cycle_carries_last_error() {
        let strategy = Arc::new(ScriptedStrategy::new("s").with_fallback(
            StrategyOutcome::Inconclusive(InconclusiveReason::Transport("refused".into())),
        ));
        let scheduler = scheduler(strategy, Arc::new(RecordingNotifier::new()));

        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::TransportFailure));
        assert_eq!(outcome.failed_attempts, 1);

        let status = scheduler.status();
        assert_eq!(status.consecutive_errors, 1);
        assert_eq!(status.last_error, Some(ErrorKind::TransportFailure));
    }

    #[tokio::test]
    async fn test_heartbeat_on_empty_cycles() {
        let strategy = Arc::new(ScriptedStrategy::always("s", vec![]));
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = scheduler(strategy, notifier.clone());

        for _ in 0..4 {
            let outcome = scheduler.run_once().await.unwrap();
            assert_eq!(outcome.error, None);
        }
        assert_eq!(notifier.status_count(StatusKind::Heartbeat), 2);
        assert_eq!(scheduler.status().total_checks, 4);
    }

    #[tokio::test]
    async fn test_run_once_rejects_invalid_config() {
        let pipeline = AcquisitionPipeline::new(vec![], Duration::from_secs(5));
        let mut config = config();
        config.retry.max_attempts = 0;
        let scheduler = MonitoringScheduler::new(
            config,
            Arc::new(pipeline),
            Arc::new(RecordingNotifier::new()),
        );

        let err = scheduler.run_once().await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ConfigurationInvalid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_while_running_is_rejected() {
        let strategy = Arc::new(ScriptedStrategy::always("s", vec![]));
        let scheduler = scheduler(strategy, Arc::new(RecordingNotifier::new()));

        scheduler.start().await.unwrap();
        assert!(matches!(
            scheduler.run_once().await,
            Err(SlotwatchError::InvalidState(_))
        ));
        scheduler.stop("test").await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
}
