//! Load shedding under sustained failure.
//!
//! After `threshold` consecutive failed cycles the effective interval doubles
//! (capped at `max_interval`) and the counter re-arms. The first successful
//! cycle restores the base interval. Checking never stops.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Consecutive failed cycles that trigger a widening.
    pub threshold: u32,
    /// Upper bound for the widened interval.
    pub max_interval: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            max_interval: Duration::from_secs(30 * 60),
        }
    }
}

/// Interval change requested by [`FailureEscalation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalChange {
    Widened { from: Duration, to: Duration },
    Restored { from: Duration, to: Duration },
}

#[derive(Debug, Clone)]
pub struct FailureEscalation {
    policy: EscalationPolicy,
    base_interval: Duration,
    effective_interval: Duration,
    consecutive_errors: u32,
    escalations: u32,
}

impl FailureEscalation {
    pub fn new(policy: EscalationPolicy, base_interval: Duration) -> Self {
        Self {
            policy,
            base_interval,
            effective_interval: base_interval,
            consecutive_errors: 0,
            escalations: 0,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn effective_interval(&self) -> Duration {
        self.effective_interval
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// How many times the interval has been widened this session.
    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    pub fn is_escalated(&self) -> bool {
        self.effective_interval > self.base_interval
    }

    /// Count a failed cycle; returns the widening when the threshold is hit.
    pub fn on_cycle_error(&mut self) -> Option<IntervalChange> {
        self.consecutive_errors += 1;
        if self.consecutive_errors < self.policy.threshold {
            return None;
        }

        self.consecutive_errors = 0;
        let from = self.effective_interval;
        // Never narrows, even if the base already exceeds the cap.
        let to = from
            .saturating_mul(2)
            .min(self.policy.max_interval)
            .max(from);
        if to == from {
            return None;
        }

        self.effective_interval = to;
        self.escalations += 1;
        Some(IntervalChange::Widened { from, to })
    }

    /// Reset the counter; returns the restoration if the interval was widened.
    pub fn on_cycle_success(&mut self) -> Option<IntervalChange> {
        self.consecutive_errors = 0;
        if !self.is_escalated() {
            return None;
        }
        let from = self.effective_interval;
        self.effective_interval = self.base_interval;
        Some(IntervalChange::Restored {
            from,
            to: self.base_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn test_threshold_doubles_once_and_rearms() {
        let mut escalation = FailureEscalation::new(EscalationPolicy::default(), mins(5));

        for _ in 0..4 {
            assert_eq!(escalation.on_cycle_error(), None);
        }
        assert_eq!(escalation.consecutive_errors(), 4);

        assert_eq!(
            escalation.on_cycle_error(),
            Some(IntervalChange::Widened {
                from: mins(5),
                to: mins(10)
            })
        );
        assert_eq!(escalation.consecutive_errors(), 0);
        assert_eq!(escalation.effective_interval(), mins(10));
        assert_eq!(escalation.escalations(), 1);
    }

    #[test]
    fn test_widening_is_capped() {
        let mut escalation = FailureEscalation::new(EscalationPolicy::default(), mins(20));
        for _ in 0..5 {
            escalation.on_cycle_error();
        }
        assert_eq!(escalation.effective_interval(), mins(30));

        for _ in 0..5 {
            escalation.on_cycle_error();
        }
        assert_eq!(escalation.effective_interval(), mins(30));
        assert_eq!(escalation.escalations(), 1);
    }

    #[test]
    fn test_base_above_cap_is_never_narrowed() {
        let mut escalation = FailureEscalation::new(EscalationPolicy::default(), mins(45));
        for _ in 0..5 {
            assert_eq!(escalation.on_cycle_error(), None);
        }
        assert_eq!(escalation.effective_interval(), mins(45));
        assert_eq!(escalation.consecutive_errors(), 0);
    }

    #[test]
    fn test_success_resets_and_restores() {
        let mut escalation = FailureEscalation::new(EscalationPolicy::default(), mins(5));
        for _ in 0..5 {
            escalation.on_cycle_error();
        }
        escalation.on_cycle_error();
        assert_eq!(escalation.consecutive_errors(), 1);

        assert_eq!(
            escalation.on_cycle_success(),
            Some(IntervalChange::Restored {
                from: mins(10),
                to: mins(5)
            })
        );
        assert_eq!(escalation.consecutive_errors(), 0);
        assert!(!escalation.is_escalated());
        assert_eq!(escalation.on_cycle_success(), None);
    }

    #[test]
    fn test_interrupted_streak_does_not_escalate() {
        let mut escalation = FailureEscalation::new(EscalationPolicy::default(), mins(5));
        for _ in 0..4 {
            escalation.on_cycle_error();
        }
        escalation.on_cycle_success();
        for _ in 0..4 {
            assert_eq!(escalation.on_cycle_error(), None);
        }
        assert_eq!(escalation.effective_interval(), mins(5));
    }
}
