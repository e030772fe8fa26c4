//! Acquisition strategies: independent ways of learning current availability.
//!
//! Every strategy answers with either `Success(items)` (possibly empty,
//! meaning "checked, nothing available") or `Inconclusive(reason)`. Expected
//! failures (transport faults, challenge pages, client-rendered shells,
//! unparseable bodies) are converted into `Inconclusive` and never escape.
//! An uninterpretable page never turns into invented items.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::{DocumentParser, FetchOptions, Fetcher, ParseOutcome};
use crate::config::{SearchWindow, TargetResource};
use crate::domain::{AvailabilityItem, ErrorKind, FetchError};

/// What a strategy needs to know about the search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionContext {
    pub target: TargetResource,
    pub search: SearchWindow,
    /// Zone filters; empty admits every zone.
    pub target_zones: Vec<String>,
}

impl AcquisitionContext {
    pub fn page_url(&self) -> String {
        self.target.page_url()
    }

    /// Absolute URL for an endpoint path, substituting `{id}`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        let path = endpoint.replace("{id}", &self.target.resource_id);
        if path.starts_with("http://") || path.starts_with("https://") {
            path
        } else {
            format!("{}/{}", self.target.base_url, path.trim_start_matches('/'))
        }
    }

    /// Whether an item falls inside the configured zone filters.
    pub fn matches_zone(&self, item: &AvailabilityItem) -> bool {
        if self.target_zones.is_empty() {
            return true;
        }
        let zone = item.zone.to_lowercase();
        let name = item.name.to_lowercase();
        self.target_zones.iter().any(|target| {
            let target = target.to_lowercase();
            zone.contains(&target) || name.contains(&target)
        })
    }

    /// Keep available, in-zone items and stamp them with the producing strategy.
    pub fn admit(&self, items: Vec<AvailabilityItem>, source: &str) -> Vec<AvailabilityItem> {
        items
            .into_iter()
            .filter(|item| item.is_available() && self.matches_zone(item))
            .map(|mut item| {
                item.source = source.to_string();
                item
            })
            .collect()
    }
}

/// Why a strategy could not determine availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum InconclusiveReason {
    /// Anti-bot interstitial instead of content.
    Blocked,
    /// Page shell whose data is loaded client-side.
    ClientRenderedShell,
    Transport(String),
    Timeout,
    HttpStatus(u16),
    EmptyBody,
    Unparseable(String),
    NoEndpointResponded,
}

impl InconclusiveReason {
    /// Error accounting class for this reason.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InconclusiveReason::Transport(_) | InconclusiveReason::Timeout => {
                ErrorKind::TransportFailure
            }
            InconclusiveReason::HttpStatus(status) if *status >= 500 => {
                ErrorKind::TransportFailure
            }
            _ => ErrorKind::Inconclusive,
        }
    }
}

impl std::fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InconclusiveReason::Blocked => write!(f, "blocked by challenge page"),
            InconclusiveReason::ClientRenderedShell => {
                write!(f, "client-rendered shell without server data")
            }
            InconclusiveReason::Transport(e) => write!(f, "transport failure: {}", e),
            InconclusiveReason::Timeout => write!(f, "timed out"),
            InconclusiveReason::HttpStatus(s) => write!(f, "unexpected HTTP status {}", s),
            InconclusiveReason::EmptyBody => write!(f, "empty response body"),
            InconclusiveReason::Unparseable(e) => write!(f, "unparseable document: {}", e),
            InconclusiveReason::NoEndpointResponded => write!(f, "no endpoint responded"),
        }
    }
}

impl From<&FetchError> for InconclusiveReason {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Timeout(_) => InconclusiveReason::Timeout,
            FetchError::Status(status) => InconclusiveReason::HttpStatus(*status),
            other => InconclusiveReason::Transport(other.to_string()),
        }
    }
}

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Success(Vec<AvailabilityItem>),
    Inconclusive(InconclusiveReason),
}

/// One method of obtaining current availability.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Stable name, used as the item `source`.
    fn name(&self) -> &'static str;

    async fn attempt(&self, ctx: &AcquisitionContext) -> StrategyOutcome;

    /// Release long-lived resources (sessions, browsers). Called on stop.
    async fn release(&self) {}
}

// ---------------------------------------------------------------------------
// DirectFetchStrategy
// ---------------------------------------------------------------------------

/// Fetch the resource page and interpret it.
pub struct DirectFetchStrategy {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn DocumentParser>,
}

impl DirectFetchStrategy {
    pub const NAME: &'static str = "direct_fetch";

    pub fn new(fetcher: Arc<dyn Fetcher>, parser: Arc<dyn DocumentParser>) -> Self {
        Self { fetcher, parser }
    }
}

#[async_trait]
impl AcquisitionStrategy for DirectFetchStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(&self, ctx: &AcquisitionContext) -> StrategyOutcome {
        let url = ctx.page_url();
        debug!(strategy = Self::NAME, url = %url, "fetching resource page");

        let response = match self.fetcher.fetch(&url, &FetchOptions::default()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(strategy = Self::NAME, url = %url, error = %e, "page fetch failed");
                return StrategyOutcome::Inconclusive((&e).into());
            }
        };

        if response.is_blocked() {
            warn!(strategy = Self::NAME, status = response.status, "challenge page served");
            return StrategyOutcome::Inconclusive(InconclusiveReason::Blocked);
        }
        if !response.has_body() {
            return StrategyOutcome::Inconclusive(InconclusiveReason::EmptyBody);
        }
        if response.status == 403 {
            // Some deployments answer 403 with real markup; let the parser decide.
            warn!(strategy = Self::NAME, "HTTP 403 with a body, attempting to parse");
        }

        match self.parser.parse(&response.body, ctx) {
            // An error page without item markup says nothing about availability.
            ParseOutcome::Items(items) if !response.is_ok() && items.is_empty() => {
                warn!(
                    strategy = Self::NAME,
                    status = response.status,
                    "non-200 page without item markup"
                );
                StrategyOutcome::Inconclusive(InconclusiveReason::HttpStatus(response.status))
            }
            ParseOutcome::Items(_) if !response.is_ok() && response.status != 403 => {
                warn!(
                    strategy = Self::NAME,
                    status = response.status,
                    "ignoring item markup on an error page"
                );
                StrategyOutcome::Inconclusive(InconclusiveReason::HttpStatus(response.status))
            }
            ParseOutcome::Items(items) => {
                let items = ctx.admit(items, Self::NAME);
                info!(strategy = Self::NAME, found = items.len(), "page interpreted");
                StrategyOutcome::Success(items)
            }
            ParseOutcome::Inconclusive(reason) => {
                info!(strategy = Self::NAME, reason = %reason, "page not interpretable");
                StrategyOutcome::Inconclusive(reason)
            }
        }
    }

    async fn release(&self) {
        self.fetcher.close().await;
    }
}

// ---------------------------------------------------------------------------
// SecondaryApiStrategy
// ---------------------------------------------------------------------------

/// Query alternate data endpoints in order; first 200 with a usable body wins.
///
/// Each endpoint gets its own request timeout so one stalled endpoint cannot
/// use up the whole strategy budget.
pub struct SecondaryApiStrategy {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn DocumentParser>,
    endpoints: Vec<String>,
    request_timeout: Option<Duration>,
}

impl SecondaryApiStrategy {
    pub const NAME: &'static str = "secondary_api";

    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn DocumentParser>,
        endpoints: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            endpoints,
            request_timeout: None,
        }
    }

    /// Bound every endpoint request; the fetcher default applies otherwise.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn options(&self, ctx: &AcquisitionContext) -> FetchOptions {
        let options = FetchOptions::default()
            .with_query("startDate", ctx.search.date_from)
            .with_query("endDate", ctx.search.date_to)
            .with_query("adults", ctx.search.adults)
            .with_query("youth", ctx.search.youth)
            .accept_json();
        match self.request_timeout {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for SecondaryApiStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(&self, ctx: &AcquisitionContext) -> StrategyOutcome {
        let options = self.options(ctx);
        let mut got_response = false;
        let mut last_transport: Option<InconclusiveReason> = None;

        for endpoint in &self.endpoints {
            let url = ctx.endpoint_url(endpoint);
            debug!(strategy = Self::NAME, url = %url, "trying endpoint");

            let response = match self.fetcher.fetch(&url, &options).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(strategy = Self::NAME, endpoint = %endpoint, error = %e, "endpoint failed");
                    last_transport = Some((&e).into());
                    continue;
                }
            };
            got_response = true;

            if !response.is_ok() || !response.has_body() || response.is_blocked() {
                debug!(
                    strategy = Self::NAME,
                    endpoint = %endpoint,
                    status = response.status,
                    "endpoint gave no usable body"
                );
                continue;
            }

            match self.parser.parse(&response.body, ctx) {
                ParseOutcome::Items(items) => {
                    let items = ctx.admit(items, Self::NAME);
                    info!(strategy = Self::NAME, endpoint = %endpoint, found = items.len(), "endpoint answered");
                    return StrategyOutcome::Success(items);
                }
                ParseOutcome::Inconclusive(reason) => {
                    debug!(strategy = Self::NAME, endpoint = %endpoint, reason = %reason, "endpoint body not interpretable");
                }
            }
        }

        info!(strategy = Self::NAME, "all endpoints failed");
        match last_transport {
            Some(reason) if !got_response => StrategyOutcome::Inconclusive(reason),
            _ => StrategyOutcome::Inconclusive(InconclusiveReason::NoEndpointResponded),
        }
    }

    async fn release(&self) {
        self.fetcher.close().await;
    }
}
