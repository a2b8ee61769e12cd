//! Scheduler configuration.

use std::time::Duration;

use chrono::TimeDelta;

use crate::{
    backoff::{BackoffStrategy, Jitter},
    trigger::MissedFirePolicy,
};

/// The default retry strategy: exponential backoff with an initial delay of 2
/// seconds, a max of 10 minutes, and a 10% jitter margin.
const DEFAULT_RETRY_STRATEGY: BackoffStrategy =
    BackoffStrategy::exponential(TimeDelta::seconds(2))
        .with_max(TimeDelta::minutes(10))
        .with_jitter(Jitter::Relative(0.1));

/// Tunables for the scheduler and leader coordinator.
///
/// # Example
///
/// ```
/// # use refire::prelude::*;
/// # use chrono::TimeDelta;
/// # use std::time::Duration;
/// let config = SchedulerConfig::new()
///     .with_max_retries(5)
///     .with_retry_strategy(BackoffStrategy::constant(TimeDelta::seconds(1)))
///     .with_default_execution_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub(crate) max_retries: u32,
    pub(crate) retry_strategy: BackoffStrategy,
    pub(crate) default_execution_timeout: Duration,
    pub(crate) schedule_tolerance: TimeDelta,
    pub(crate) recovery_window: TimeDelta,
    pub(crate) rescan_interval: Duration,
    pub(crate) missed_fire_policy: MissedFirePolicy,
    pub(crate) capture_exception_details: bool,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            max_retries: 3,
            retry_strategy: DEFAULT_RETRY_STRATEGY,
            default_execution_timeout: Duration::from_secs(30),
            schedule_tolerance: TimeDelta::seconds(1),
            recovery_window: TimeDelta::minutes(10),
            rescan_interval: Duration::from_secs(300),
            missed_fire_policy: MissedFirePolicy::SkipToNow,
            capture_exception_details: false,
        }
    }

    /// How many RETRY cycles a failing job goes through before ERROR.
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The backoff computing the delay before each retry.
    pub const fn with_retry_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Bound for a dispatch attempt when the job does not carry its own.
    pub const fn with_default_execution_timeout(mut self, timeout: Duration) -> Self {
        self.default_execution_timeout = timeout;
        self
    }

    /// How far in the past a first fire instant may lie and still be accepted
    /// (it then fires immediately); anything older fails with
    /// `InvalidScheduleTime`.
    pub const fn with_schedule_tolerance(mut self, tolerance: TimeDelta) -> Self {
        self.schedule_tolerance = tolerance;
        self
    }

    /// The future span scanned from the repository when taking leadership.
    pub const fn with_recovery_window(mut self, window: TimeDelta) -> Self {
        self.recovery_window = window;
        self
    }

    /// How often the active leader re-scans the sliding recovery window.
    pub const fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    /// Catch-up behavior for interval occurrences missed across downtime.
    pub const fn with_missed_fire_policy(mut self, policy: MissedFirePolicy) -> Self {
        self.missed_fire_policy = policy;
        self
    }

    /// Record structured failure details on the job via the configured
    /// exception extractors.
    pub const fn with_exception_capture(mut self, capture: bool) -> Self {
        self.capture_exception_details = capture;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
