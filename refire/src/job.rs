//! The persisted unit of work and its wire-facing companions.

use std::{collections::HashMap, fmt::Display, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trigger::Trigger;

pub mod builder;

pub use builder::{JobPatch, NewJob};

/// Identity of a job, also the idempotency key recipients deduplicate on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// A fresh server-generated id (UUID v4), used when the caller did not
    /// supply one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle states.
///
/// `Scheduled → Running → {Executed | Retry | Error | Canceled}`, with
/// `Retry → Running` cycling up to the configured retry ceiling. A repeating
/// job loops from a successful `Running` back to `Scheduled` until its trigger
/// is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Scheduled,
    Running,
    Executed,
    Retry,
    Error,
    Canceled,
}

impl JobStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Error | Self::Canceled)
    }

    /// States from which a fire request may claim the job for execution.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Retry)
    }
}

/// Descriptor of the external target a dispatch invokes, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Recipient {
    Http(HttpRecipient),
}

impl Recipient {
    /// An HTTP recipient POSTing to `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http(HttpRecipient::new(url))
    }

    /// The discriminant name used in wire encodings and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
        }
    }
}

impl From<HttpRecipient> for Recipient {
    fn from(value: HttpRecipient) -> Self {
        Self::Http(value)
    }
}

/// The reference recipient kind: an HTTP endpoint invoked per occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRecipient {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl HttpRecipient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_owned(),
            headers: Default::default(),
            query_params: Default::default(),
            body: None,
        }
    }

    pub fn with_method(self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..self
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(self, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }
}

/// The persisted unit of work.
///
/// Mutated only by the scheduler/repository pair once created: the scheduler
/// drives status transitions, counters, and trigger advancement; the
/// repository stamps the audit fields on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub id: JobId,
    pub correlation_id: Option<String>,
    pub status: JobStatus,
    pub trigger: Trigger,
    pub recipient: Recipient,
    pub priority: i32,
    pub retries: u32,
    pub execution_counter: u32,
    pub execution_timeout: Option<Duration>,
    pub created: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub scheduled_id: Option<String>,
    pub last_exception: Option<JobExceptionDetails>,
}

/// Normalized outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionResponse {
    pub job_id: JobId,
    /// Transport-level status, e.g. `"200"`.
    pub code: String,
    pub message: Option<String>,
}

impl JobExecutionResponse {
    /// Any 2xx transport status counts as success.
    pub fn is_success(&self) -> bool {
        self.code
            .parse::<u16>()
            .is_ok_and(|code| (200..300).contains(&code))
    }
}

/// Structured capture of a dispatch failure, recorded on the job when
/// exception capture is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExceptionDetails {
    pub error_type: String,
    pub message: String,
}
