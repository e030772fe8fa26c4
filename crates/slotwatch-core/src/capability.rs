//! Capability traits for the external collaborators of the monitoring loop.
//!
//! - `Fetcher`: `fetch(url, options) -> FetchResponse | FetchError`
//! - `DocumentParser`: `parse(body) -> items | Inconclusive`
//! - `Notifier`: availability, status and error delivery plus reachability
//!
//! Concrete implementations live outside the core (`slotwatch-http`);
//! in-memory ones for tests live in [`crate::fakes`].

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AvailabilityItem, FetchError, NotifyError};
use crate::strategy::{AcquisitionContext, InconclusiveReason};

/// Substrings that identify an anti-bot interstitial rather than content.
const CHALLENGE_MARKERS: [&str; 6] = [
    "<title>Just a moment",
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "Attention Required! | Cloudflare",
    "Checking your browser before accessing",
];

/// Per-request options for [`Fetcher::fetch`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,

    /// Overall request timeout; the fetcher default applies when `None`.
    pub timeout: Option<Duration>,

    /// `Accept` header override.
    pub accept: Option<String>,
}

impl FetchOptions {
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn accept_json(mut self) -> Self {
        self.accept = Some("application/json".to_string());
        self
    }
}

/// Raw document returned by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    blocked: bool,
}

impl FetchResponse {
    /// Build a response; the blocked flag is derived from the content.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let blocked = is_challenge_page(&body);
        Self {
            status,
            body,
            blocked,
        }
    }

    /// True when the document is an anti-bot / challenge interstitial.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// Challenge detection from response content.
///
/// A 403/503 alone is not enough: the site sometimes serves real markup with
/// a 403, so only the markers decide.
pub fn is_challenge_page(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Fetch capability.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions)
        -> Result<FetchResponse, FetchError>;

    /// Release any long-lived session. Called when the scheduler stops.
    async fn close(&self) {}
}

/// Parse result: items, or an explicit "could not interpret".
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Items(Vec<AvailabilityItem>),
    Inconclusive(InconclusiveReason),
}

/// Parse capability. Parsing is synchronous; only I/O suspends.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, body: &str, ctx: &AcquisitionContext) -> ParseOutcome;
}

/// Kind of non-availability message sent through the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Start,
    Stop,
    Warning,
    /// Low-priority "still watching" message; sent silently.
    Heartbeat,
}

/// Notify capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Probe the delivery channel. `false` fails `start()`.
    async fn test_reachable(&self) -> bool;

    /// Deliver newly available items.
    async fn notify(&self, items: &[AvailabilityItem]) -> Result<(), NotifyError>;

    async fn notify_status(&self, kind: StatusKind, message: &str) -> Result<(), NotifyError>;

    async fn notify_error(&self, message: &str) -> Result<(), NotifyError>;
}
