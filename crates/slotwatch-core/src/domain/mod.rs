//! Domain models for slotwatch.
//!
//! - `AvailabilityItem` / `IdentityKey`: observed slots and their identity
//! - `CycleOutcome`: result of one check cycle
//! - `MonitoringStatus` / `SchedulerState`: queryable scheduler status
//! - error taxonomy shared by every layer

pub mod error;
pub mod item;
pub mod outcome;
pub mod status;

pub use error::{ErrorKind, FetchError, NotifyError, Result, SlotwatchError};
pub use item::{AvailabilityItem, IdentityKey, ItemStatus};
pub use outcome::CycleOutcome;
pub use status::{MonitoringStatus, SchedulerState};
