//! Backoff strategies for computing the delay before a retry attempt.
//!
//! All of the constructors and configuration functions are `const`, so a
//! strategy can be built into a configuration constant.
//!
//! # Example
//!
//! ```
//! # use refire::prelude::*;
//! # use chrono::TimeDelta;
//! let strategy = BackoffStrategy::exponential(TimeDelta::seconds(2))
//!     .with_max(TimeDelta::seconds(30));
//!
//! assert_eq!(strategy.backoff(1), TimeDelta::seconds(2));
//! assert_eq!(strategy.backoff(2), TimeDelta::seconds(4));
//! assert_eq!(strategy.backoff(3), TimeDelta::seconds(8));
//! assert_eq!(strategy.backoff(5), TimeDelta::seconds(30));
//! ```

use chrono::TimeDelta;
use rand::Rng;

/// A retry delay computation, optionally bounded and jittered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStrategy {
    kind: Kind,
    max: Option<TimeDelta>,
    jitter: Jitter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Constant(TimeDelta),
    Exponential(TimeDelta),
}

/// Randomization applied on top of the computed delay, spreading retries of
/// jobs that failed at the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    None,
    /// A uniform offset in `[-margin, +margin]`.
    Absolute(TimeDelta),
    /// A uniform offset in `[-delay * fraction, +delay * fraction]`.
    Relative(f64),
}

impl BackoffStrategy {
    /// The same delay for every attempt.
    pub const fn constant(delay: TimeDelta) -> Self {
        Self {
            kind: Kind::Constant(delay),
            max: None,
            jitter: Jitter::None,
        }
    }

    /// `base` for the first attempt, doubling with each further attempt.
    pub const fn exponential(base: TimeDelta) -> Self {
        Self {
            kind: Kind::Exponential(base),
            max: None,
            jitter: Jitter::None,
        }
    }

    /// Caps the computed delay before jitter is applied.
    pub const fn with_max(mut self, max: TimeDelta) -> Self {
        self.max = Some(max);
        self
    }

    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay to wait before retry number `attempt` (1-based).
    ///
    /// Never returns a negative delay, whatever the jitter draws.
    pub fn backoff(&self, attempt: u32) -> TimeDelta {
        let raw = match self.kind {
            Kind::Constant(delay) => delay,
            Kind::Exponential(base) => {
                let factor = 2_i64.saturating_pow(attempt.saturating_sub(1));
                TimeDelta::milliseconds(base.num_milliseconds().saturating_mul(factor))
            }
        };
        let bounded = match self.max {
            Some(max) if raw > max => max,
            _ => raw,
        };
        self.jitter.apply(bounded).max(TimeDelta::zero())
    }
}

impl Jitter {
    fn apply(self, delay: TimeDelta) -> TimeDelta {
        let margin = match self {
            Self::None => return delay,
            Self::Absolute(margin) => margin.num_milliseconds(),
            Self::Relative(fraction) => (delay.num_milliseconds() as f64 * fraction) as i64,
        };
        if margin <= 0 {
            return delay;
        }
        delay + TimeDelta::milliseconds(rand::thread_rng().gen_range(-margin..=margin))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_ignores_the_attempt() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(10));
        assert_eq!(strategy.backoff(1), TimeDelta::seconds(10));
        assert_eq!(strategy.backoff(7), TimeDelta::seconds(10));
    }

    #[test]
    fn exponential_doubles_up_to_the_max() {
        let strategy =
            BackoffStrategy::exponential(TimeDelta::seconds(2)).with_max(TimeDelta::seconds(30));
        assert_eq!(strategy.backoff(1), TimeDelta::seconds(2));
        assert_eq!(strategy.backoff(2), TimeDelta::seconds(4));
        assert_eq!(strategy.backoff(4), TimeDelta::seconds(16));
        assert_eq!(strategy.backoff(5), TimeDelta::seconds(30));
        assert_eq!(strategy.backoff(100), TimeDelta::seconds(30));
    }

    #[test]
    fn large_attempts_do_not_overflow() {
        let strategy = BackoffStrategy::exponential(TimeDelta::seconds(2));
        assert!(strategy.backoff(u32::MAX) > TimeDelta::zero());
    }

    #[test]
    fn absolute_jitter_stays_within_the_margin() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(20))
            .with_jitter(Jitter::Absolute(TimeDelta::seconds(10)));
        for _ in 0..100 {
            let delay = strategy.backoff(1);
            assert!(delay >= TimeDelta::seconds(10));
            assert!(delay <= TimeDelta::seconds(30));
        }
    }

    #[test]
    fn relative_jitter_scales_with_the_delay() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(100))
            .with_jitter(Jitter::Relative(0.1));
        for _ in 0..100 {
            let delay = strategy.backoff(1);
            assert!(delay >= TimeDelta::seconds(90));
            assert!(delay <= TimeDelta::seconds(110));
        }
    }

    #[test]
    fn jitter_never_goes_negative() {
        let strategy = BackoffStrategy::constant(TimeDelta::zero())
            .with_jitter(Jitter::Absolute(TimeDelta::seconds(5)));
        for _ in 0..100 {
            assert!(strategy.backoff(1) >= TimeDelta::zero());
        }
    }
}
