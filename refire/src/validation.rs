//! Structural validation of creation and patch requests, applied before
//! anything reaches the scheduler.

use std::time::Duration;

use chrono::TimeDelta;
use reqwest::{Method, Url};
use thiserror::Error;

use crate::{
    dispatcher::DispatcherRegistry,
    job::{JobPatch, NewJob, Recipient},
    trigger::{IntervalTrigger, Trigger},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job id must not be empty")]
    EmptyId,
    #[error("recipient url `{0}` is not a valid http url")]
    InvalidUrl(String),
    #[error("unsupported http method `{0}`")]
    InvalidMethod(String),
    #[error("trigger period must be positive")]
    NonPositivePeriod,
    #[error("repeat limit must be -1 or greater")]
    InvalidRepeatLimit,
    #[error("trigger end time must not precede its start time")]
    EndBeforeStart,
    #[error("execution timeout must be positive")]
    NonPositiveTimeout,
    #[error("execution timeout {requested:?} exceeds the `{kind}` dispatcher maximum {max:?}")]
    TimeoutAboveCap {
        requested: Duration,
        max: Duration,
        kind: &'static str,
    },
    #[error("no dispatcher accepts recipient kind `{0}`")]
    UnsupportedRecipient(&'static str),
    #[error("field `{0}` cannot be patched, only the trigger may change")]
    ForbiddenPatchField(&'static str),
    #[error("patch must carry a trigger")]
    EmptyPatch,
}

/// Checks a creation request against the configured dispatchers.
///
/// A recipient nobody accepts and a timeout above the accepting dispatcher's
/// cap are rejected here rather than discovered at dispatch time.
pub fn validate_new_job(
    job: &NewJob,
    dispatchers: &DispatcherRegistry,
) -> Result<(), ValidationError> {
    if job.id.as_ref().is_some_and(|id| id.as_str().is_empty()) {
        return Err(ValidationError::EmptyId);
    }
    validate_trigger(&job.trigger)?;
    validate_recipient(&job.recipient)?;

    let Some(dispatcher) = dispatchers.dispatcher_for(&job.recipient) else {
        return Err(ValidationError::UnsupportedRecipient(job.recipient.kind()));
    };
    if let Some(requested) = job.execution_timeout {
        if requested.is_zero() {
            return Err(ValidationError::NonPositiveTimeout);
        }
        if let Some(max) = dispatcher.max_timeout() {
            if requested > max {
                return Err(ValidationError::TimeoutAboveCap {
                    requested,
                    max,
                    kind: job.recipient.kind(),
                });
            }
        }
    }
    Ok(())
}

/// Checks a merge request: only trigger fields may be present.
pub fn validate_patch(patch: &JobPatch) -> Result<(), ValidationError> {
    if patch.recipient.is_some() {
        return Err(ValidationError::ForbiddenPatchField("recipient"));
    }
    if patch.priority.is_some() {
        return Err(ValidationError::ForbiddenPatchField("priority"));
    }
    if patch.correlation_id.is_some() {
        return Err(ValidationError::ForbiddenPatchField("correlationId"));
    }
    if patch.execution_timeout.is_some() {
        return Err(ValidationError::ForbiddenPatchField("executionTimeout"));
    }
    let Some(trigger) = &patch.trigger else {
        return Err(ValidationError::EmptyPatch);
    };
    validate_trigger(trigger)
}

fn validate_trigger(trigger: &Trigger) -> Result<(), ValidationError> {
    match trigger {
        Trigger::PointInTime(_) => Ok(()),
        Trigger::Interval(interval) => validate_interval(interval),
    }
}

fn validate_interval(interval: &IntervalTrigger) -> Result<(), ValidationError> {
    if interval.period() <= TimeDelta::zero() {
        return Err(ValidationError::NonPositivePeriod);
    }
    if interval.repeat_limit() < IntervalTrigger::REPEAT_UNBOUNDED {
        return Err(ValidationError::InvalidRepeatLimit);
    }
    if interval
        .end_time()
        .is_some_and(|end| end < interval.start_time())
    {
        return Err(ValidationError::EndBeforeStart);
    }
    Ok(())
}

fn validate_recipient(recipient: &Recipient) -> Result<(), ValidationError> {
    match recipient {
        Recipient::Http(http) => {
            let url =
                Url::parse(&http.url).map_err(|_| ValidationError::InvalidUrl(http.url.clone()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ValidationError::InvalidUrl(http.url.clone()));
            }
            Method::from_bytes(http.method.as_bytes())
                .map_err(|_| ValidationError::InvalidMethod(http.method.clone()))?;
            Ok(())
        }
    }
}
