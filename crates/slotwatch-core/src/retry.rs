//! Bounded retry around the acquisition pipeline.
//!
//! An empty result is retried after `base_delay * attempt`; the first
//! non-empty result stops the loop. Failed attempts (no strategy conclusive)
//! follow the same retry rule but are counted separately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{AvailabilityItem, ErrorKind};
use crate::pipeline::AcquisitionPipeline;
use crate::strategy::AcquisitionContext;

/// Retry bound and linear backoff base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay after attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// What the retry loop observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport {
    /// Items from the last attempt.
    pub items: Vec<AvailabilityItem>,
    pub attempts_used: u32,
    /// Attempts in which no strategy was conclusive.
    pub failed_attempts: u32,
    /// Error class of the most recent failed attempt.
    pub last_error: Option<ErrorKind>,
}

impl RetryReport {
    /// True when every attempt failed (nothing was ever determined).
    pub fn all_failed(&self) -> bool {
        self.attempts_used > 0 && self.failed_attempts == self.attempts_used
    }
}

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the pipeline up to `max_attempts` times. Never fails.
    pub async fn run_with_retry(
        &self,
        pipeline: &AcquisitionPipeline,
        ctx: &AcquisitionContext,
    ) -> RetryReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut report = RetryReport {
            items: Vec::new(),
            attempts_used: 0,
            failed_attempts: 0,
            last_error: None,
        };

        for attempt in 1..=max_attempts {
            report.attempts_used = attempt;
            info!(attempt, max_attempts, "acquisition attempt");

            let result = pipeline.run(ctx).await;
            if let Some(kind) = result.error_kind() {
                report.failed_attempts += 1;
                report.last_error = Some(kind);
                warn!(
                    attempt,
                    remaining = max_attempts - attempt,
                    error = %kind,
                    "acquisition attempt failed"
                );
            }
            report.items = result.into_items();

            if !report.items.is_empty() {
                info!(attempt, found = report.items.len(), "availability found");
                break;
            }

            if attempt < max_attempts {
                let delay = self.policy.delay_after(attempt);
                info!(attempt, delay_ms = delay.as_millis() as u64, "nothing found, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        report
    }
}
