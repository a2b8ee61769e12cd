//! Request types for creating and patching jobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trigger::Trigger;

use super::{JobDetails, JobId, JobStatus, Recipient};

/// A job creation request as accepted at the service boundary.
///
/// The trigger and recipient are mandatory; everything else defaults. The id
/// is generated server-side when absent.
///
/// # Example
///
/// ```
/// # use refire::prelude::*;
/// # use chrono::{TimeDelta, Utc};
/// let job = NewJob::new(
///     Trigger::point_in_time(Utc::now() + TimeDelta::minutes(5)),
///     Recipient::http("http://localhost:8080/callback"),
/// )
/// .with_correlation_id("order-42")
/// .with_priority(10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[serde(default)]
    pub id: Option<JobId>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub trigger: Trigger,
    pub recipient: Recipient,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub execution_timeout: Option<Duration>,
}

impl NewJob {
    pub fn new(trigger: Trigger, recipient: Recipient) -> Self {
        Self {
            id: None,
            correlation_id: None,
            trigger,
            recipient,
            priority: 0,
            execution_timeout: None,
        }
    }

    pub fn with_id(self, id: impl Into<JobId>) -> Self {
        Self {
            id: Some(id.into()),
            ..self
        }
    }

    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..self
        }
    }

    /// Higher priorities fire first among equally-due jobs during recovery.
    pub fn with_priority(self, priority: i32) -> Self {
        Self { priority, ..self }
    }

    /// Bound for a single dispatch attempt, capped by the accepting
    /// dispatcher's maximum at validation time.
    pub fn with_execution_timeout(self, timeout: Duration) -> Self {
        Self {
            execution_timeout: Some(timeout),
            ..self
        }
    }

    pub(crate) fn into_details(self) -> JobDetails {
        JobDetails {
            id: self.id.unwrap_or_else(JobId::generate),
            correlation_id: self.correlation_id,
            status: JobStatus::Scheduled,
            trigger: self.trigger,
            recipient: self.recipient,
            priority: self.priority,
            retries: 0,
            execution_counter: 0,
            execution_timeout: self.execution_timeout,
            created: None,
            last_update: None,
            scheduled_id: None,
            last_exception: None,
        }
    }
}

/// A merge-style partial update.
///
/// Only the trigger may be patched; the remaining fields exist so a populated
/// one can be rejected by validation instead of silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobPatch {
    pub trigger: Option<Trigger>,
    pub recipient: Option<Recipient>,
    pub priority: Option<i32>,
    pub correlation_id: Option<String>,
    pub execution_timeout: Option<Duration>,
}

impl JobPatch {
    /// A patch replacing only the trigger.
    pub fn reschedule(trigger: Trigger) -> Self {
        Self {
            trigger: Some(trigger),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    #[test]
    fn generates_an_id_when_absent() {
        let new_job = NewJob::new(
            Trigger::point_in_time(Utc::now()),
            Recipient::http("http://localhost/cb"),
        );
        let details = new_job.into_details();
        assert!(!details.id.as_str().is_empty());
        assert_eq!(details.status, JobStatus::Scheduled);
        assert_eq!(details.retries, 0);
        assert_eq!(details.execution_counter, 0);
    }

    #[test]
    fn keeps_a_caller_supplied_id() {
        let details = NewJob::new(
            Trigger::point_in_time(Utc::now()),
            Recipient::http("http://localhost/cb"),
        )
        .with_id("caller-chose-this")
        .into_details();
        assert_eq!(details.id, JobId::from("caller-chose-this"));
    }
}
