//! Per-recipient-kind execution of the actual side effect.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{JobDetails, JobExecutionResponse, Recipient};

pub mod http;

/// Executes dispatches for one kind of [`Recipient`].
///
/// Implementations discriminate via [`RecipientDispatcher::accept`] and are
/// scanned in registration order; the first accepting dispatcher wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientDispatcher: Send + Sync {
    /// Whether this dispatcher handles the given recipient kind.
    fn accept(&self, recipient: &Recipient) -> bool;

    /// Performs one dispatch attempt, bounded by `timeout`.
    ///
    /// An `Ok` response carries the transport status whatever it was; the
    /// registry classifies non-2xx codes as failures.
    async fn execute(
        &self,
        job: &JobDetails,
        timeout: Duration,
    ) -> Result<JobExecutionResponse, DispatchError>;

    /// The upper bound a job's `execution_timeout` may request for this kind,
    /// enforced at validation time.
    fn max_timeout(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no dispatcher accepts recipient kind `{0}`")]
    UnsupportedRecipient(String),
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("recipient responded with non-success code {code}")]
    Failed {
        code: String,
        message: Option<String>,
    },
}

/// Ordered collection of dispatchers, resolved once at construction and
/// passed into the scheduler.
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: Vec<Box<dyn RecipientDispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dispatcher; earlier registrations take precedence.
    pub fn with_dispatcher(mut self, dispatcher: impl RecipientDispatcher + 'static) -> Self {
        self.dispatchers.push(Box::new(dispatcher));
        self
    }

    /// The first dispatcher accepting the recipient, if any.
    pub fn dispatcher_for(&self, recipient: &Recipient) -> Option<&dyn RecipientDispatcher> {
        self.dispatchers
            .iter()
            .find(|dispatcher| dispatcher.accept(recipient))
            .map(|dispatcher| &**dispatcher)
    }

    /// The timeout cap of the dispatcher that would handle this recipient.
    pub fn max_timeout_for(&self, recipient: &Recipient) -> Option<Duration> {
        self.dispatcher_for(recipient)
            .and_then(RecipientDispatcher::max_timeout)
    }

    /// Dispatches one occurrence, normalizing non-2xx responses into
    /// [`DispatchError::Failed`].
    pub async fn dispatch(
        &self,
        job: &JobDetails,
        timeout: Duration,
    ) -> Result<JobExecutionResponse, DispatchError> {
        let dispatcher = self.dispatcher_for(&job.recipient).ok_or_else(|| {
            DispatchError::UnsupportedRecipient(job.recipient.kind().to_owned())
        })?;
        let response = dispatcher.execute(job, timeout).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(DispatchError::Failed {
                code: response.code,
                message: response.message,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use crate::{
        job::{JobId, NewJob},
        trigger::Trigger,
    };

    use super::*;

    fn http_job() -> JobDetails {
        NewJob::new(
            Trigger::point_in_time(Utc::now()),
            Recipient::http("http://localhost:8080/callback"),
        )
        .with_id("job-1")
        .into_details()
    }

    fn response(code: &str) -> JobExecutionResponse {
        JobExecutionResponse {
            job_id: JobId::from("job-1"),
            code: code.to_owned(),
            message: None,
        }
    }

    #[tokio::test]
    async fn empty_registry_rejects_every_recipient() {
        let registry = DispatcherRegistry::new();
        let result = registry
            .dispatch(&http_job(), Duration::from_secs(1))
            .await;
        assert_matches!(result, Err(DispatchError::UnsupportedRecipient(kind)) if kind == "http");
    }

    #[tokio::test]
    async fn first_accepting_dispatcher_wins() {
        let mut refusing = MockRecipientDispatcher::new();
        refusing.expect_accept().return_const(false);

        let mut accepting = MockRecipientDispatcher::new();
        accepting.expect_accept().return_const(true);
        accepting
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(response("200")));

        let mut shadowed = MockRecipientDispatcher::new();
        shadowed.expect_accept().return_const(true);
        shadowed.expect_execute().never();

        let registry = DispatcherRegistry::new()
            .with_dispatcher(refusing)
            .with_dispatcher(accepting)
            .with_dispatcher(shadowed);

        let response = registry
            .dispatch(&http_job(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.code, "200");
    }

    #[tokio::test]
    async fn non_success_codes_are_normalized_into_failures() {
        let mut dispatcher = MockRecipientDispatcher::new();
        dispatcher.expect_accept().return_const(true);
        dispatcher
            .expect_execute()
            .returning(|_, _| Ok(response("503")));

        let registry = DispatcherRegistry::new().with_dispatcher(dispatcher);
        let result = registry
            .dispatch(&http_job(), Duration::from_secs(1))
            .await;
        assert_matches!(result, Err(DispatchError::Failed { code, .. }) if code == "503");
    }
}
