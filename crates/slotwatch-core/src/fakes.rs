//! In-memory fakes for the capability traits (testing only)
//!
//! Provides `StaticFetcher`, `FnParser`, `ScriptedStrategy` and
//! `RecordingNotifier`, which satisfy the trait contracts without any
//! network access.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::capability::{
    DocumentParser, FetchOptions, FetchResponse, Fetcher, Notifier, ParseOutcome, StatusKind,
};
use crate::domain::{AvailabilityItem, FetchError, NotifyError};
use crate::strategy::{AcquisitionContext, AcquisitionStrategy, InconclusiveReason, StrategyOutcome};

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

/// Fetcher answering from a `HashMap<url, response>`; unknown URLs fail to connect.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, Result<FetchResponse, FetchError>>>,
    requests: Mutex<Vec<(String, FetchOptions)>>,
    closed: AtomicBool,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: FetchResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn last_options(&self) -> Option<FetchOptions> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, options)| options.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));
        self.routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Connect(format!("no route to {}", url))))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// FnParser
// ---------------------------------------------------------------------------

type ParseFn = dyn Fn(&str, &AcquisitionContext) -> ParseOutcome + Send + Sync;

/// Parser backed by a closure.
pub struct FnParser {
    parse: Box<ParseFn>,
}

impl FnParser {
    pub fn new<F>(parse: F) -> Self
    where
        F: Fn(&str, &AcquisitionContext) -> ParseOutcome + Send + Sync + 'static,
    {
        Self {
            parse: Box::new(parse),
        }
    }
}

impl DocumentParser for FnParser {
    fn parse(&self, body: &str, ctx: &AcquisitionContext) -> ParseOutcome {
        (self.parse)(body, ctx)
    }
}

// ---------------------------------------------------------------------------
// ScriptedStrategy
// ---------------------------------------------------------------------------

/// Strategy that replays queued outcomes, then repeats a fallback.
pub struct ScriptedStrategy {
    name: &'static str,
    script: Mutex<VecDeque<StrategyOutcome>>,
    fallback: StrategyOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    released: AtomicBool,
}

impl ScriptedStrategy {
    /// A strategy that is always inconclusive unless scripted otherwise.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            script: Mutex::new(VecDeque::new()),
            fallback: StrategyOutcome::Inconclusive(InconclusiveReason::NoEndpointResponded),
            delay: None,
            calls: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// A strategy that always succeeds with `items`.
    pub fn always(name: &'static str, items: Vec<AvailabilityItem>) -> Self {
        Self::new(name).with_fallback(StrategyOutcome::Success(items))
    }

    pub fn with_fallback(mut self, outcome: StrategyOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// Sleep this long inside every attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an outcome for the next unscripted attempt.
    pub fn push(&self, outcome: StrategyOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcquisitionStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn attempt(&self, _ctx: &AcquisitionContext) -> StrategyOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records everything it is asked to deliver.
#[derive(Debug)]
pub struct RecordingNotifier {
    reachable: AtomicBool,
    fail_deliveries: AtomicBool,
    deliveries: Mutex<Vec<Vec<AvailabilityItem>>>,
    statuses: Mutex<Vec<(StatusKind, String)>>,
    errors: Mutex<Vec<String>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            fail_deliveries: AtomicBool::new(false),
            deliveries: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        let notifier = Self::default();
        notifier.reachable.store(false, Ordering::SeqCst);
        notifier
    }

    /// Make subsequent `notify` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_deliveries.store(failing, Ordering::SeqCst);
    }

    /// Every successful `notify` batch, in order.
    pub fn deliveries(&self) -> Vec<Vec<AvailabilityItem>> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.deliveries.lock().unwrap().iter().map(Vec::len).sum()
    }

    pub fn statuses(&self) -> Vec<(StatusKind, String)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn status_count(&self, kind: StatusKind) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn test_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn notify(&self, items: &[AvailabilityItem]) -> Result<(), NotifyError> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("delivery disabled".to_string()));
        }
        self.deliveries.lock().unwrap().push(items.to_vec());
        Ok(())
    }

    async fn notify_status(&self, kind: StatusKind, message: &str) -> Result<(), NotifyError> {
        self.statuses
            .lock()
            .unwrap()
            .push((kind, message.to_string()));
        Ok(())
    }

    async fn notify_error(&self, message: &str) -> Result<(), NotifyError> {
        self.errors.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
