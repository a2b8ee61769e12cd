//! Single-active-scheduler coordination.
//!
//! Exactly one instance per cluster owns armed timers; the cluster-membership
//! collaborator decides who, and tells this coordinator via
//! [`LeaderCoordinator::become_active`] / [`LeaderCoordinator::become_passive`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::SchedulerConfig,
    job::JobStatus,
    repository::JobRepository,
    scheduler::{JobScheduler, SchedulerError},
};

/// Drives a [`JobScheduler`] between active and passive leadership states.
///
/// On activation it re-arms jobs due inside the recovery window from the
/// repository and keeps re-scanning on a sliding window, so memory stays
/// bounded however many jobs the store holds. Cheap to clone.
#[derive(Clone)]
pub struct LeaderCoordinator<R> {
    scheduler: JobScheduler<R>,
    config: SchedulerConfig,
    rescan: Arc<Mutex<Option<CancellationToken>>>,
}

impl<R> LeaderCoordinator<R>
where
    R: JobRepository + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(scheduler: JobScheduler<R>, config: SchedulerConfig) -> Self {
        Self {
            scheduler,
            config,
            rescan: Default::default(),
        }
    }

    /// Takes leadership: runs the recovery scan, starts the sliding-window
    /// rescan loop, and lets the scheduler arm timers. Idempotent.
    ///
    /// The initial scan starts from the epoch so occurrences that came due
    /// while no leader was active are picked up and fired immediately.
    pub async fn become_active(&self) -> Result<(), SchedulerError> {
        let token = CancellationToken::new();
        {
            let mut rescan = self.rescan_guard();
            if rescan.is_some() {
                return Ok(());
            }
            *rescan = Some(token.clone());
        }
        self.scheduler.set_active(true);
        tracing::info!("Scheduler instance became the active leader");

        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(coordinator.config.rescan_interval) => {
                        let _ = coordinator.scan(Utc::now()).await.inspect_err(|err| {
                            tracing::error!(?err, "Recovery rescan failed: {err}");
                        });
                    }
                }
            }
            tracing::debug!("Stopped the recovery rescan loop");
        });

        self.scan(DateTime::<Utc>::MIN_UTC).await
    }

    /// Releases leadership: stops the rescan loop and disarms pending timers.
    /// Occurrences already claimed by an in-flight dispatch finish on their
    /// own. Idempotent.
    pub fn become_passive(&self) {
        let Some(token) = self.rescan_guard().take() else {
            return;
        };
        token.cancel();
        self.scheduler.set_active(false);
        self.scheduler.disarm_all();
        tracing::info!("Scheduler instance became passive");
    }

    pub fn is_active(&self) -> bool {
        self.rescan_guard().is_some()
    }

    async fn scan(&self, from: DateTime<Utc>) -> Result<(), SchedulerError> {
        let to = Utc::now() + self.config.recovery_window;
        let due = self
            .scheduler
            .repository()
            .find_by_status_between_dates(from, to, &[JobStatus::Scheduled, JobStatus::Retry])
            .await?;
        if !due.is_empty() {
            tracing::debug!("Re-arming {} jobs due before {to}", due.len());
        }
        for job in &due {
            self.scheduler.arm_recovered(job);
        }
        Ok(())
    }

    fn rescan_guard(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.rescan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use async_trait::async_trait;
    use chrono::TimeDelta;
    use futures::Stream;

    use crate::{
        dispatcher::{DispatchError, DispatcherRegistry, RecipientDispatcher},
        exception::ExceptionExtractorRegistry,
        job::{JobDetails, JobExecutionResponse, NewJob, Recipient},
        repository::memory::InMemoryRepository,
        stream::job_stream,
        trigger::Trigger,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingDispatcher {
        fired: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl RecipientDispatcher for RecordingDispatcher {
        fn accept(&self, _recipient: &Recipient) -> bool {
            true
        }

        async fn execute(
            &self,
            job: &JobDetails,
            _timeout: Duration,
        ) -> Result<JobExecutionResponse, DispatchError> {
            self.fired.lock().unwrap().push(job.id.to_string());
            Ok(JobExecutionResponse {
                job_id: job.id.clone(),
                code: "200".to_owned(),
                message: None,
            })
        }
    }

    fn setup(
        repository: InMemoryRepository,
        dispatcher: RecordingDispatcher,
        config: SchedulerConfig,
    ) -> (
        LeaderCoordinator<InMemoryRepository>,
        JobScheduler<InMemoryRepository>,
        impl Stream<Item = JobDetails>,
    ) {
        let (sink, stream) = job_stream();
        let scheduler = JobScheduler::new(
            repository,
            Arc::new(DispatcherRegistry::new().with_dispatcher(dispatcher)),
            Arc::new(ExceptionExtractorRegistry::new()),
            Arc::new(sink),
            config,
        );
        let coordinator = LeaderCoordinator::new(scheduler.clone(), config);
        (coordinator, scheduler, stream)
    }

    fn stored_job(id: &str, fire_in: TimeDelta) -> JobDetails {
        NewJob::new(
            Trigger::point_in_time(Utc::now() + fire_in),
            Recipient::http("http://localhost:8080/callback"),
        )
        .with_id(id)
        .into_details()
    }

    async fn wait_for_fired(fired: &Arc<StdMutex<Vec<String>>>, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if fired.lock().unwrap().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for recovered jobs to fire");
    }

    #[tokio::test]
    async fn becoming_active_recovers_due_and_overdue_jobs() {
        let repository = InMemoryRepository::new();
        // One job due soon, one already overdue when leadership arrives.
        repository
            .save(stored_job("due-soon", TimeDelta::milliseconds(50)))
            .await
            .unwrap();
        repository
            .save(stored_job("overdue", TimeDelta::seconds(-5)))
            .await
            .unwrap();

        let dispatcher = RecordingDispatcher::default();
        let fired = dispatcher.fired.clone();
        let (coordinator, _scheduler, _stream) =
            setup(repository, dispatcher, SchedulerConfig::new());

        coordinator.become_active().await.unwrap();
        assert!(coordinator.is_active());

        wait_for_fired(&fired, 2).await;
        let mut fired = fired.lock().unwrap().clone();
        fired.sort();
        assert_eq!(fired, vec!["due-soon", "overdue"]);
    }

    #[tokio::test]
    async fn jobs_beyond_the_window_wait_for_a_rescan() {
        let repository = InMemoryRepository::new();
        repository
            .save(stored_job("far-future", TimeDelta::milliseconds(300)))
            .await
            .unwrap();

        let dispatcher = RecordingDispatcher::default();
        let fired = dispatcher.fired.clone();
        // A tiny window with fast rescans: the job is outside the first scan
        // but inside a later one.
        let config = SchedulerConfig::new()
            .with_recovery_window(TimeDelta::milliseconds(100))
            .with_rescan_interval(Duration::from_millis(50));
        let (coordinator, _scheduler, _stream) = setup(repository, dispatcher, config);

        coordinator.become_active().await.unwrap();
        assert!(fired.lock().unwrap().is_empty());

        wait_for_fired(&fired, 1).await;
    }

    #[tokio::test]
    async fn becoming_passive_stops_pending_timers() {
        let dispatcher = RecordingDispatcher::default();
        let fired = dispatcher.fired.clone();
        let (coordinator, scheduler, _stream) = setup(
            InMemoryRepository::new(),
            dispatcher,
            SchedulerConfig::new().with_rescan_interval(Duration::from_secs(300)),
        );

        coordinator.become_active().await.unwrap();
        let job = scheduler
            .schedule(NewJob::new(
                Trigger::point_in_time(Utc::now() + TimeDelta::milliseconds(100)),
                Recipient::http("http://localhost:8080/callback"),
            ))
            .await
            .unwrap();

        coordinator.become_passive();
        assert!(!coordinator.is_active());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(fired.lock().unwrap().is_empty());

        // A later activation recovers the job and it fires.
        coordinator.become_active().await.unwrap();
        wait_for_fired(&fired, 1).await;
        assert_eq!(fired.lock().unwrap()[0], job.id.to_string());
    }

    #[tokio::test]
    async fn activation_and_release_are_idempotent() {
        let (coordinator, _scheduler, _stream) = setup(
            InMemoryRepository::new(),
            RecordingDispatcher::default(),
            SchedulerConfig::new(),
        );

        coordinator.become_active().await.unwrap();
        coordinator.become_active().await.unwrap();
        assert!(coordinator.is_active());

        coordinator.become_passive();
        coordinator.become_passive();
        assert!(!coordinator.is_active());
    }
}
