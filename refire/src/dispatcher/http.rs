//! The HTTP reference dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};

use crate::job::{JobDetails, JobExecutionResponse, Recipient};

use super::{DispatchError, RecipientDispatcher};

/// Dispatches [`Recipient::Http`] jobs by invoking the configured endpoint.
///
/// The outbound request is built from the recipient's method, url, headers,
/// query parameters and body, plus a `limit` query parameter carrying the
/// trigger's remaining-occurrences count so the endpoint can observe how many
/// further calls to expect.
#[derive(Debug, Clone, Default)]
pub struct HttpDispatcher {
    client: Client,
}

impl HttpDispatcher {
    /// The largest `execution_timeout` a job may request for HTTP recipients.
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipientDispatcher for HttpDispatcher {
    fn accept(&self, recipient: &Recipient) -> bool {
        matches!(recipient, Recipient::Http(_))
    }

    fn max_timeout(&self) -> Option<Duration> {
        Some(Self::MAX_TIMEOUT)
    }

    async fn execute(
        &self,
        job: &JobDetails,
        timeout: Duration,
    ) -> Result<JobExecutionResponse, DispatchError> {
        let Recipient::Http(recipient) = &job.recipient;

        let method = Method::from_bytes(recipient.method.as_bytes())
            .map_err(|err| DispatchError::Transport(err.to_string()))?;
        let url = Url::parse(&recipient.url)
            .map_err(|err| DispatchError::Transport(err.to_string()))?;

        let limit = job.trigger.remaining_occurrences().to_string();
        let mut request = self
            .client
            .request(method, url)
            .timeout(timeout)
            .query(&recipient.query_params)
            .query(&[("limit", limit.as_str())]);
        for (name, value) in &recipient.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &recipient.body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => {
                let code = response.status().as_u16().to_string();
                let message = response.text().await.ok().filter(|text| !text.is_empty());
                Ok(JobExecutionResponse {
                    job_id: job.id.clone(),
                    code,
                    message,
                })
            }
            Err(error) if error.is_timeout() => Err(DispatchError::Timeout(timeout)),
            Err(error) => Err(DispatchError::Transport(error.to_string())),
        }
    }
}
