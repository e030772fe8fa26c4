//! Monitor configuration.
//!
//! The core consumes a typed [`MonitorConfig`]; where the values come from is
//! up to the caller. [`MonitorConfig::from_env`] reads the process
//! environment, [`MonitorConfig::from_lookup`] reads any key/value source.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Result, SlotwatchError};
use crate::escalation::EscalationPolicy;
use crate::retry::RetryPolicy;
use crate::strategy::AcquisitionContext;

pub const DEFAULT_BASE_URL: &str = "https://camfit.co.kr";
pub const DEFAULT_RESOURCE_ID: &str = "66992898908bb2001e4a650e";
pub const DEFAULT_TARGET_ZONES: &str = "D ZONE,C ZONE";
pub const DEFAULT_INTERVAL_MINS: u64 = 5;
pub const DEFAULT_HEARTBEAT_EVERY: u64 = 10;
pub const DEFAULT_STRATEGY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_API_ENDPOINTS: [&str; 3] = [
    "/api/camp/{id}/availability",
    "/api/reservations/check",
    "/api/sites/available",
];

const MIN_INTERVAL: Duration = Duration::from_secs(60);
const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// The remote resource being watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    /// Site root, without trailing slash.
    pub base_url: String,
    /// Campsite identifier on the site.
    pub resource_id: String,
}

impl TargetResource {
    pub fn new(base_url: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resource_id: resource_id.into(),
        }
    }

    /// Public page for the resource (also used as the booking link).
    pub fn page_url(&self) -> String {
        format!("{}/camp/{}", self.base_url, self.resource_id)
    }
}

/// Date range and party size being searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub adults: u32,
    pub youth: u32,
}

impl SearchWindow {
    /// `YYYY-MM-DD ~ YYYY-MM-DD`
    pub fn period(&self) -> String {
        format!("{} ~ {}", self.date_from, self.date_to)
    }
}

/// Everything the monitoring loop needs to run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub target: TargetResource,
    pub search: SearchWindow,

    /// Zone filters. Empty means every zone.
    pub target_zones: Vec<String>,

    /// Base cadence of the recurring trigger.
    pub check_interval: Duration,

    pub retry: RetryPolicy,

    /// Time budget for a single strategy attempt.
    pub strategy_timeout: Duration,

    /// Upper bound for one secondary API request.
    pub api_request_timeout: Duration,

    pub escalation: EscalationPolicy,

    /// Send a quiet heartbeat every N empty cycles (0 disables).
    pub heartbeat_every: u64,

    /// Secondary API endpoint paths, `{id}` is replaced by the resource id.
    pub api_endpoints: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: TargetResource::new(DEFAULT_BASE_URL, DEFAULT_RESOURCE_ID),
            search: SearchWindow {
                date_from: NaiveDate::from_ymd_opt(2024, 9, 13).unwrap_or_default(),
                date_to: NaiveDate::from_ymd_opt(2024, 9, 14).unwrap_or_default(),
                adults: 2,
                youth: 2,
            },
            target_zones: split_list(DEFAULT_TARGET_ZONES),
            check_interval: Duration::from_secs(DEFAULT_INTERVAL_MINS * 60),
            retry: RetryPolicy::default(),
            strategy_timeout: Duration::from_secs(DEFAULT_STRATEGY_TIMEOUT_SECS),
            api_request_timeout: Duration::from_secs(DEFAULT_API_REQUEST_TIMEOUT_SECS),
            escalation: EscalationPolicy::default(),
            heartbeat_every: DEFAULT_HEARTBEAT_EVERY,
            api_endpoints: DEFAULT_API_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MonitorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup, falling back to defaults.
    ///
    /// Keys: `CAMP_BASE_URL`, `CAMP_ID`, `TARGET_ZONES`, `CHECK_DATE_FROM`,
    /// `CHECK_DATE_TO`, `ADULTS_COUNT`, `YOUTH_COUNT`, `MONITORING_INTERVAL`
    /// (minutes), `MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`,
    /// `STRATEGY_TIMEOUT_SECS`, `API_REQUEST_TIMEOUT_SECS`, `ESCALATION_THRESHOLD`,
    /// `ESCALATION_MAX_INTERVAL` (minutes), `HEARTBEAT_EVERY`, `API_ENDPOINTS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let target = TargetResource::new(
            get("CAMP_BASE_URL").unwrap_or(defaults.target.base_url),
            get("CAMP_ID").unwrap_or(defaults.target.resource_id),
        );

        let search = SearchWindow {
            date_from: parse_date(get("CHECK_DATE_FROM"), "CHECK_DATE_FROM")?
                .unwrap_or(defaults.search.date_from),
            date_to: parse_date(get("CHECK_DATE_TO"), "CHECK_DATE_TO")?
                .unwrap_or(defaults.search.date_to),
            adults: parse_num(get("ADULTS_COUNT"), "ADULTS_COUNT")?
                .unwrap_or(defaults.search.adults),
            youth: parse_num(get("YOUTH_COUNT"), "YOUTH_COUNT")?
                .unwrap_or(defaults.search.youth),
        };

        let target_zones = get("TARGET_ZONES")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.target_zones);

        let check_interval = parse_minutes(get("MONITORING_INTERVAL"), "MONITORING_INTERVAL")?
            .unwrap_or(defaults.check_interval);

        let retry = RetryPolicy {
            max_attempts: parse_num(get("MAX_ATTEMPTS"), "MAX_ATTEMPTS")?
                .unwrap_or(defaults.retry.max_attempts),
            base_delay: parse_num::<u64>(get("RETRY_BASE_DELAY_MS"), "RETRY_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
        };

        let strategy_timeout =
            parse_num::<u64>(get("STRATEGY_TIMEOUT_SECS"), "STRATEGY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.strategy_timeout);

        let api_request_timeout =
            parse_num::<u64>(get("API_REQUEST_TIMEOUT_SECS"), "API_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.api_request_timeout);

        let escalation = EscalationPolicy {
            threshold: parse_num(get("ESCALATION_THRESHOLD"), "ESCALATION_THRESHOLD")?
                .unwrap_or(defaults.escalation.threshold),
            max_interval: parse_minutes(get("ESCALATION_MAX_INTERVAL"), "ESCALATION_MAX_INTERVAL")?
                .unwrap_or(defaults.escalation.max_interval),
        };

        let heartbeat_every = parse_num(get("HEARTBEAT_EVERY"), "HEARTBEAT_EVERY")?
            .unwrap_or(defaults.heartbeat_every);

        let api_endpoints = get("API_ENDPOINTS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.api_endpoints);

        Ok(Self {
            target,
            search,
            target_zones,
            check_interval,
            retry,
            strategy_timeout,
            api_request_timeout,
            escalation,
            heartbeat_every,
            api_endpoints,
        })
    }

    /// Check the configuration; any violation is `ConfigurationInvalid`.
    pub fn validate(&self) -> Result<()> {
        if self.target.base_url.is_empty() {
            return Err(invalid("base URL must not be empty"));
        }
        if self.target.resource_id.is_empty() {
            return Err(invalid("resource id must not be empty"));
        }
        if self.search.date_from > self.search.date_to {
            return Err(invalid(format!(
                "search start {} is after search end {}",
                self.search.date_from, self.search.date_to
            )));
        }
        if self.check_interval < MIN_INTERVAL || self.check_interval > MAX_INTERVAL {
            return Err(invalid(format!(
                "check interval must be between 1 and 60 minutes, got {}s",
                self.check_interval.as_secs()
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("max attempts must be at least 1"));
        }
        if self.escalation.threshold == 0 {
            return Err(invalid("escalation threshold must be at least 1"));
        }
        if self.strategy_timeout.is_zero() {
            return Err(invalid("strategy timeout must be positive"));
        }
        if self.api_request_timeout.is_zero() {
            return Err(invalid("API request timeout must be positive"));
        }
        Ok(())
    }

    /// Timeout for one secondary API request.
    ///
    /// Capped at an equal share of the strategy budget so every endpoint
    /// gets its turn before the budget runs out.
    pub fn api_endpoint_timeout(&self) -> Duration {
        let endpoints = u32::try_from(self.api_endpoints.len())
            .unwrap_or(u32::MAX)
            .max(1);
        self.api_request_timeout.min(self.strategy_timeout / endpoints)
    }

    /// Context handed to every acquisition strategy.
    pub fn acquisition_context(&self) -> AcquisitionContext {
        AcquisitionContext {
            target: self.target.clone(),
            search: self.search.clone(),
            target_zones: self.target_zones.clone(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> SlotwatchError {
    SlotwatchError::ConfigurationInvalid(msg.into())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_num<T: std::str::FromStr>(raw: Option<String>, key: &str) -> Result<Option<T>> {
    raw.map(|v| {
        v.parse::<T>()
            .map_err(|_| invalid(format!("{key} is not a valid number: {v:?}")))
    })
    .transpose()
}

/// Whole minutes as a `Duration`; values too large to represent are invalid.
fn parse_minutes(raw: Option<String>, key: &str) -> Result<Option<Duration>> {
    parse_num::<u64>(raw, key)?
        .map(|mins| {
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| invalid(format!("{key} is out of range: {mins} minutes")))
        })
        .transpose()
}

fn parse_date(raw: Option<String>, key: &str) -> Result<Option<NaiveDate>> {
    raw.map(|v| {
        NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map_err(|_| invalid(format!("{key} must use YYYY-MM-DD, got {v:?}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.target_zones, vec!["D ZONE", "C ZONE"]);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.escalation.threshold, 5);
        assert_eq!(config.api_endpoints.len(), 3);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("CAMP_BASE_URL", "https://example.test/"),
            ("CAMP_ID", "abc"),
            ("TARGET_ZONES", " C ZONE , ,D ZONE"),
            ("CHECK_DATE_FROM", "2025-09-08"),
            ("CHECK_DATE_TO", "2025-09-09"),
            ("MONITORING_INTERVAL", "10"),
            ("RETRY_BASE_DELAY_MS", "500"),
            ("ESCALATION_MAX_INTERVAL", "45"),
        ]))
        .expect("config should parse");

        assert_eq!(config.target.page_url(), "https://example.test/camp/abc");
        assert_eq!(config.target_zones, vec!["C ZONE", "D ZONE"]);
        assert_eq!(config.search.period(), "2025-09-08 ~ 2025-09-09");
        assert_eq!(config.check_interval, Duration::from_secs(600));
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.escalation.max_interval, Duration::from_secs(45 * 60));
        config.validate().expect("config should validate");
    }

    #[test]
    fn test_malformed_number_is_invalid() {
        let err = MonitorConfig::from_lookup(lookup(&[("MAX_ATTEMPTS", "three")])).unwrap_err();
        assert!(matches!(err, SlotwatchError::ConfigurationInvalid(_)));
        assert!(err.to_string().contains("MAX_ATTEMPTS"));
    }

    #[test]
    fn test_oversized_minutes_are_invalid() {
        for key in ["MONITORING_INTERVAL", "ESCALATION_MAX_INTERVAL"] {
            let err = MonitorConfig::from_lookup(lookup(&[(key, "307445734561825861")]))
                .unwrap_err();
            assert!(matches!(err, SlotwatchError::ConfigurationInvalid(_)));
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_api_endpoint_timeout_shares_budget() {
        let mut config = MonitorConfig::default();
        assert_eq!(config.api_endpoint_timeout(), Duration::from_secs(10));

        config.strategy_timeout = Duration::from_secs(3);
        assert_eq!(config.api_endpoint_timeout(), Duration::from_secs(1));

        config.api_endpoints.clear();
        assert_eq!(config.api_endpoint_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_malformed_date_is_invalid() {
        let err =
            MonitorConfig::from_lookup(lookup(&[("CHECK_DATE_FROM", "09/08/2025")])).unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_validate_rejects_reversed_window() {
        let mut config = MonitorConfig::default();
        config.search.date_from = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        config.search.date_to = NaiveDate::from_ymd_opt(2025, 9, 8).unwrap();
        assert!(matches!(
            config.validate(),
            Err(SlotwatchError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_interval_out_of_range() {
        let mut config = MonitorConfig::default();
        config.check_interval = Duration::from_secs(30);
        assert!(config.validate().is_err());
        config.check_interval = Duration::from_secs(61 * 60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = MonitorConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_acquisition_context_carries_search() {
        let config = MonitorConfig::default();
        let ctx = config.acquisition_context();
        assert_eq!(ctx.search, config.search);
        assert_eq!(ctx.target_zones, config.target_zones);
    }
}
