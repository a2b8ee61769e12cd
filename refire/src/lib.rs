//! A standalone job-scheduling engine: jobs carry a trigger and a recipient
//! descriptor; the engine persists them, arms timers, claims each due
//! occurrence atomically, dispatches it with a bounded timeout, and applies
//! retry/terminal transitions. A leader coordinator keeps exactly one cluster
//! instance arming timers.

use std::sync::Arc;

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod exception;
pub mod job;
pub mod leader;
pub mod prelude;
pub mod repository;
pub mod scheduler;
pub mod stream;
pub mod trigger;
pub mod validation;

use config::SchedulerConfig;
use dispatcher::{DispatcherRegistry, RecipientDispatcher};
use exception::{ExceptionExtractor, ExceptionExtractorRegistry};
use job::{JobDetails, JobId, JobPatch, NewJob};
use leader::LeaderCoordinator;
use repository::JobRepository;
use scheduler::{JobScheduler, SchedulerError};
use stream::{NoopSink, StatusSink};

/// The assembled service: scheduler plus leader coordinator over one
/// repository.
///
/// # Example
///
/// ```no_run
/// # use refire::prelude::*;
/// # use chrono::{TimeDelta, Utc};
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let service = JobService::builder(InMemoryRepository::new())
///     .with_dispatcher(HttpDispatcher::new())
///     .build();
/// service.start().await.unwrap();
///
/// let job = service
///     .schedule(NewJob::new(
///         Trigger::point_in_time(Utc::now() + TimeDelta::minutes(5)),
///         Recipient::http("http://localhost:8080/callback"),
///     ))
///     .await
///     .unwrap();
///
/// service.cancel(&job.id).await.unwrap();
/// service.graceful_shutdown();
/// # });
/// ```
pub struct JobService<R: JobRepository> {
    scheduler: JobScheduler<R>,
    coordinator: LeaderCoordinator<R>,
}

impl<R> JobService<R>
where
    R: JobRepository + Clone + Send + Sync + 'static,
{
    pub fn builder(repository: R) -> JobServiceBuilder<R> {
        JobServiceBuilder {
            repository,
            config: SchedulerConfig::default(),
            dispatchers: DispatcherRegistry::new(),
            extractors: ExceptionExtractorRegistry::new(),
            sink: Arc::new(NoopSink),
        }
    }

    /// Promotes this instance to active leader: recovery scan, rescan loop,
    /// and timer arming. Single-node deployments call this right after
    /// construction; clustered ones from their membership callback.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.coordinator.become_active().await
    }

    /// Releases leadership before process exit so a passive instance can
    /// promote itself. In-flight dispatches finish on their own.
    pub fn graceful_shutdown(&self) {
        self.coordinator.become_passive();
    }

    pub async fn schedule(&self, new_job: NewJob) -> Result<JobDetails, SchedulerError> {
        self.scheduler.schedule(new_job).await
    }

    pub async fn reschedule(
        &self,
        id: &JobId,
        patch: JobPatch,
    ) -> Result<JobDetails, SchedulerError> {
        self.scheduler.reschedule(id, patch).await
    }

    pub async fn cancel(&self, id: &JobId) -> Result<JobDetails, SchedulerError> {
        self.scheduler.cancel(id).await
    }

    pub async fn get(&self, id: &JobId) -> Result<JobDetails, SchedulerError> {
        self.scheduler.get(id).await
    }

    pub async fn delete(&self, id: &JobId) -> Result<Option<JobDetails>, SchedulerError> {
        self.scheduler.delete(id).await
    }

    pub fn scheduler(&self) -> &JobScheduler<R> {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &LeaderCoordinator<R> {
        &self.coordinator
    }
}

/// Builder wiring dispatchers, extractors, sink, and config into a
/// [`JobService`]. Registries are resolved here, once, at construction.
pub struct JobServiceBuilder<R> {
    repository: R,
    config: SchedulerConfig,
    dispatchers: DispatcherRegistry,
    extractors: ExceptionExtractorRegistry,
    sink: Arc<dyn StatusSink>,
}

impl<R> JobServiceBuilder<R>
where
    R: JobRepository + Clone + Send + Sync + 'static,
{
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a dispatcher; earlier registrations take precedence.
    pub fn with_dispatcher(mut self, dispatcher: impl RecipientDispatcher + 'static) -> Self {
        self.dispatchers = self.dispatchers.with_dispatcher(dispatcher);
        self
    }

    /// Registers an exception extractor; the first producing details wins.
    pub fn with_exception_extractor(mut self, extractor: impl ExceptionExtractor + 'static) -> Self {
        self.extractors = self.extractors.with_extractor(extractor);
        self
    }

    /// Receives a snapshot on every job state transition, fire and forget.
    pub fn with_status_sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn build(self) -> JobService<R> {
        let scheduler = JobScheduler::new(
            self.repository,
            Arc::new(self.dispatchers),
            Arc::new(self.extractors),
            self.sink,
            self.config,
        );
        let coordinator = LeaderCoordinator::new(scheduler.clone(), self.config);
        JobService {
            scheduler,
            coordinator,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeDelta, Utc};
    use futures::StreamExt;
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        dispatcher::http::HttpDispatcher,
        job::{JobStatus, Recipient},
        repository::memory::InMemoryRepository,
        stream::job_stream,
        trigger::Trigger,
    };

    use super::*;

    #[tokio::test]
    async fn one_shot_http_job_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callback"))
            .and(query_param("limit", "0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (sink, stream) = job_stream();
        let service = JobService::builder(InMemoryRepository::new())
            .with_dispatcher(HttpDispatcher::new())
            .with_status_sink(sink)
            .build();
        service.start().await.unwrap();
        tokio::pin!(stream);

        service
            .schedule(NewJob::new(
                Trigger::point_in_time(Utc::now() + TimeDelta::milliseconds(100)),
                Recipient::http(format!("{}/callback", server.uri())),
            ))
            .await
            .unwrap();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let job = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("timed out waiting for a status change")
                .expect("status stream ended");
            statuses.push(job.status);
        }
        assert_eq!(
            statuses,
            vec![JobStatus::Scheduled, JobStatus::Running, JobStatus::Executed]
        );

        service.graceful_shutdown();
        assert!(!service.scheduler().is_active());
        assert!(!service.coordinator().is_active());
    }
}
