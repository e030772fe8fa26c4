//! Acquisition pipeline: strategies in priority order, first success wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::{AvailabilityItem, ErrorKind};
use crate::strategy::{AcquisitionContext, AcquisitionStrategy, InconclusiveReason, StrategyOutcome};

/// A strategy that did not resolve the run, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub reason: InconclusiveReason,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    /// Items from the resolving strategy; empty when none resolved.
    pub items: Vec<AvailabilityItem>,

    /// Strategy that returned `Success`, if any.
    pub resolved_by: Option<&'static str>,

    /// Strategies tried before resolution (or all of them).
    pub failures: Vec<StrategyFailure>,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Whether some strategy determined availability (even "none").
    pub fn is_conclusive(&self) -> bool {
        self.resolved_by.is_some()
    }

    /// Error class of an inconclusive run, from the last failure seen.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        if self.is_conclusive() {
            return None;
        }
        Some(
            self.failures
                .last()
                .map(|f| f.reason.kind())
                .unwrap_or(ErrorKind::Inconclusive),
        )
    }

    pub fn into_items(self) -> Vec<AvailabilityItem> {
        self.items
    }
}

/// Ordered set of strategies sharing one time budget per attempt.
pub struct AcquisitionPipeline {
    strategies: Vec<Arc<dyn AcquisitionStrategy>>,
    strategy_timeout: Duration,
}

impl AcquisitionPipeline {
    pub fn new(strategies: Vec<Arc<dyn AcquisitionStrategy>>, strategy_timeout: Duration) -> Self {
        Self {
            strategies,
            strategy_timeout,
        }
    }

    /// Strategy names in priority order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies in order and return the first success.
    ///
    /// Never fails: when every strategy is inconclusive the result is empty
    /// with `resolved_by == None`. Owns no state; it only observes the
    /// remote resource.
    pub async fn run(&self, ctx: &AcquisitionContext) -> PipelineResult {
        let start = Instant::now();
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            debug!(strategy = name, "attempting strategy");

            let outcome = match tokio::time::timeout(self.strategy_timeout, strategy.attempt(ctx))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        strategy = name,
                        timeout_ms = self.strategy_timeout.as_millis() as u64,
                        "strategy exceeded its time budget"
                    );
                    StrategyOutcome::Inconclusive(InconclusiveReason::Timeout)
                }
            };

            match outcome {
                StrategyOutcome::Success(items) => {
                    info!(strategy = name, found = items.len(), "strategy resolved availability");
                    return PipelineResult {
                        items,
                        resolved_by: Some(name),
                        failures,
                        duration_ms: start.elapsed().as_millis() as u64,
                    };
                }
                StrategyOutcome::Inconclusive(reason) => {
                    info!(strategy = name, reason = %reason, "strategy inconclusive");
                    failures.push(StrategyFailure {
                        strategy: name,
                        reason,
                    });
                }
            }
        }

        warn!(
            tried = failures.len(),
            "no strategy could determine availability; treating as none available"
        );
        PipelineResult {
            items: Vec::new(),
            resolved_by: None,
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Release resources held by every strategy.
    pub async fn close(&self) {
        for strategy in &self.strategies {
            strategy.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::fakes::ScriptedStrategy;
    use chrono::NaiveDate;

    fn ctx() -> AcquisitionContext {
        MonitorConfig::default().acquisition_context()
    }

    fn item(name: &str) -> AvailabilityItem {
        AvailabilityItem::available(
            name,
            "C ZONE",
            NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            "scripted",
        )
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = Arc::new(ScriptedStrategy::always("first", vec![item("C존 A1")]));
        let second = Arc::new(ScriptedStrategy::always("second", vec![item("C존 A2")]));
        let pipeline = AcquisitionPipeline::new(
            vec![first.clone(), second.clone()],
            Duration::from_secs(5),
        );

        let result = pipeline.run(&ctx()).await;
        assert_eq!(result.resolved_by, Some("first"));
        assert_eq!(result.items, vec![item("C존 A1")]);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_empty_success_short_circuits() {
        let first = Arc::new(ScriptedStrategy::always("first", vec![]));
        let second = Arc::new(ScriptedStrategy::always("second", vec![item("C존 A2")]));
        let pipeline = AcquisitionPipeline::new(
            vec![first.clone(), second.clone()],
            Duration::from_secs(5),
        );

        let result = pipeline.run(&ctx()).await;
        assert!(result.is_conclusive());
        assert!(result.items.is_empty());
        assert_eq!(second.calls(), 0);
        assert_eq!(result.error_kind(), None);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_strategy() {
        let first = Arc::new(ScriptedStrategy::new("first"));
        let second = Arc::new(ScriptedStrategy::always("second", vec![item("C존 A2")]));
        let pipeline = AcquisitionPipeline::new(
            vec![first.clone(), second.clone()],
            Duration::from_secs(5),
        );

        let result = pipeline.run(&ctx()).await;
        assert_eq!(result.resolved_by, Some("second"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy, "first");
    }

    #[tokio::test]
    async fn test_all_inconclusive_yields_empty() {
        let first = Arc::new(ScriptedStrategy::new("first"));
        let second = Arc::new(ScriptedStrategy::new("second").with_fallback(
            StrategyOutcome::Inconclusive(InconclusiveReason::Transport("reset".into())),
        ));
        let pipeline = AcquisitionPipeline::new(vec![first, second], Duration::from_secs(5));

        let result = pipeline.run(&ctx()).await;
        assert!(!result.is_conclusive());
        assert!(result.items.is_empty());
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.error_kind(), Some(ErrorKind::TransportFailure));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_strategy_times_out() {
        let slow = Arc::new(
            ScriptedStrategy::always("slow", vec![item("C존 A1")])
                .with_delay(Duration::from_secs(60)),
        );
        let fallback = Arc::new(ScriptedStrategy::always("fallback", vec![]));
        let pipeline = AcquisitionPipeline::new(vec![slow, fallback], Duration::from_secs(1));

        let result = pipeline.run(&ctx()).await;
        assert_eq!(result.resolved_by, Some("fallback"));
        assert_eq!(result.failures[0].reason, InconclusiveReason::Timeout);
    }

    #[tokio::test]
    async fn test_close_releases_all_strategies() {
        let first = Arc::new(ScriptedStrategy::new("first"));
        let second = Arc::new(ScriptedStrategy::new("second"));
        let pipeline = AcquisitionPipeline::new(
            vec![first.clone(), second.clone()],
            Duration::from_secs(5),
        );

        pipeline.close().await;
        assert!(first.was_released());
        assert!(second.was_released());
        assert_eq!(pipeline.strategy_names(), vec!["first", "second"]);
    }
}
