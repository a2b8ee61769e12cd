//! The trigger model: pure computation of when a job next fires.
//!
//! A [`Trigger`] never performs I/O. The scheduler peeks the next fire instant
//! via [`Trigger::next_fire_time`] and, after dispatching an occurrence, calls
//! [`Trigger::advance`] exactly once to record it and compute the following
//! instant.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Policy for catching up when one or more interval occurrences were missed,
/// for example because no scheduler instance was active when they came due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissedFirePolicy {
    /// Skip missed occurrences: only the next instant lying in the future is
    /// computed. Skipped occurrences do not count against the repeat limit.
    #[default]
    SkipToNow,
    /// Replay every missed occurrence: each advance yields the next instant in
    /// the original sequence even when it already lies in the past, so missed
    /// occurrences fire immediately one after another.
    ReplayAll,
}

/// When a job fires, encoded as a tagged union so the wire and storage forms
/// carry an explicit discriminant instead of relying on payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Trigger {
    /// Fires exactly once at a fixed instant.
    PointInTime(PointInTimeTrigger),
    /// Fires repeatedly on a fixed period, optionally bounded by a repeat
    /// limit and/or an end instant.
    Interval(IntervalTrigger),
}

impl Trigger {
    /// A trigger firing once at `fire_time`.
    pub fn point_in_time(fire_time: DateTime<Utc>) -> Self {
        PointInTimeTrigger::new(fire_time).into()
    }

    /// A repeating trigger first firing at `start_time`, then every `period`.
    ///
    /// `repeat_limit` follows the wire convention: `-1` repeats without bound,
    /// `0` fires once, and `N` fires `N + 1` times in total.
    pub fn interval(start_time: DateTime<Utc>, period: TimeDelta, repeat_limit: i32) -> Self {
        IntervalTrigger::new(start_time, period, repeat_limit).into()
    }

    /// The next due instant, or [`None`] once the trigger is exhausted.
    ///
    /// Peeking never mutates the trigger.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::PointInTime(trigger) => (!trigger.fired).then_some(trigger.fire_time),
            Self::Interval(trigger) => trigger.next_fire_time,
        }
    }

    /// Whether the trigger still has a due instant ahead of it.
    pub fn has_next_fire_time(&self) -> bool {
        self.next_fire_time().is_some()
    }

    /// Records the occurrence that just fired and computes the new next-fire
    /// instant, or exhausts the trigger.
    ///
    /// Must be called exactly once per fired occurrence. Calling it on an
    /// already exhausted trigger is a no-op.
    pub fn advance(&mut self, now: DateTime<Utc>, policy: MissedFirePolicy) {
        match self {
            Self::PointInTime(trigger) => trigger.fired = true,
            Self::Interval(trigger) => trigger.advance(now, policy),
        }
    }

    /// How many further occurrences a recipient should expect after the one
    /// currently firing: `0` for a one-shot trigger, `-1` for an unbounded
    /// interval, otherwise `repeat_limit - repeat_count`.
    pub fn remaining_occurrences(&self) -> i64 {
        match self {
            Self::PointInTime(_) => 0,
            Self::Interval(trigger) if trigger.repeat_limit == IntervalTrigger::REPEAT_UNBOUNDED => {
                -1
            }
            Self::Interval(trigger) => {
                (i64::from(trigger.repeat_limit) - i64::from(trigger.repeat_count)).max(0)
            }
        }
    }
}

impl From<PointInTimeTrigger> for Trigger {
    fn from(value: PointInTimeTrigger) -> Self {
        Self::PointInTime(value)
    }
}

impl From<IntervalTrigger> for Trigger {
    fn from(value: IntervalTrigger) -> Self {
        Self::Interval(value)
    }
}

/// A single-shot trigger: one instant, exhausted after it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointInTimeTrigger {
    fire_time: DateTime<Utc>,
    #[serde(default)]
    fired: bool,
}

impl PointInTimeTrigger {
    pub fn new(fire_time: DateTime<Utc>) -> Self {
        Self {
            fire_time,
            fired: false,
        }
    }

    pub fn fire_time(&self) -> DateTime<Utc> {
        self.fire_time
    }
}

/// A repeating trigger with a fixed period.
///
/// Exhausted when `repeat_count` exceeds a bounded `repeat_limit` or when the
/// next instant would pass `end_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalTrigger {
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    period_millis: i64,
    repeat_limit: i32,
    #[serde(default)]
    repeat_count: i32,
    next_fire_time: Option<DateTime<Utc>>,
}

impl IntervalTrigger {
    /// The `repeat_limit` value meaning "repeat without bound".
    pub const REPEAT_UNBOUNDED: i32 = -1;

    pub fn new(start_time: DateTime<Utc>, period: TimeDelta, repeat_limit: i32) -> Self {
        Self {
            start_time,
            end_time: None,
            period_millis: period.num_milliseconds(),
            repeat_limit,
            repeat_count: 0,
            next_fire_time: Some(start_time),
        }
    }

    /// Hard stop: no occurrence fires after this instant.
    pub fn with_end_time(self, end_time: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(end_time),
            ..self
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn period(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.period_millis)
    }

    pub fn repeat_limit(&self) -> i32 {
        self.repeat_limit
    }

    /// Occurrences already fired.
    pub fn repeat_count(&self) -> i32 {
        self.repeat_count
    }

    fn advance(&mut self, now: DateTime<Utc>, policy: MissedFirePolicy) {
        let Some(current) = self.next_fire_time else {
            return;
        };
        self.repeat_count += 1;
        if self.repeat_limit != Self::REPEAT_UNBOUNDED && self.repeat_count > self.repeat_limit {
            self.next_fire_time = None;
            return;
        }
        let period = self.period();
        if period <= TimeDelta::zero() {
            // A nonpositive period cannot make progress.
            self.next_fire_time = None;
            return;
        }
        let mut next = current + period;
        if policy == MissedFirePolicy::SkipToNow {
            while next <= now {
                next += period;
            }
        }
        if self.end_time.is_some_and(|end| next > end) {
            self.next_fire_time = None;
        } else {
            self.next_fire_time = Some(next);
        }
    }
}
