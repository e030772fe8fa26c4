//! slotwatch core library
//!
//! The monitoring control loop for reservation availability: acquisition
//! strategies behind capability traits, a retrying pipeline, identity-based
//! deduplication, failure escalation and the scheduler that drives them.
//! Concrete HTTP and Telegram collaborators live in `slotwatch-http`.

pub mod capability;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod escalation;
pub mod fakes;
pub mod obs;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod strategy;
pub mod telemetry;

pub use capability::{
    is_challenge_page, DocumentParser, FetchOptions, FetchResponse, Fetcher, Notifier,
    ParseOutcome, StatusKind,
};
pub use config::{MonitorConfig, SearchWindow, TargetResource};
pub use dedup::DeduplicationStore;
pub use domain::{
    AvailabilityItem, CycleOutcome, ErrorKind, FetchError, IdentityKey, ItemStatus,
    MonitoringStatus, NotifyError, Result, SchedulerState, SlotwatchError,
};
pub use escalation::{EscalationPolicy, FailureEscalation, IntervalChange};
pub use pipeline::{AcquisitionPipeline, PipelineResult, StrategyFailure};
pub use retry::{RetryExecutor, RetryPolicy, RetryReport};
pub use scheduler::MonitoringScheduler;
pub use strategy::{
    AcquisitionContext, AcquisitionStrategy, DirectFetchStrategy, InconclusiveReason,
    SecondaryApiStrategy, StrategyOutcome,
};

/// Crate version, reported by the daemon's health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
