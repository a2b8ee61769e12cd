//! The job scheduler: arms one timer per job, claims due occurrences, and
//! drives the state machine from dispatch outcomes.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SchedulerConfig,
    dispatcher::{DispatchError, DispatcherRegistry},
    exception::ExceptionExtractorRegistry,
    job::{JobDetails, JobId, JobPatch, JobStatus, NewJob},
    repository::{JobRepository, RepositoryError},
    stream::StatusSink,
    trigger::Trigger,
    validation::{self, ValidationError},
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("trigger fire time {0:?} is not reachable")]
    InvalidScheduleTime(Option<DateTime<Utc>>),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Orchestrates job execution over a repository and a dispatcher registry.
///
/// Cheap to clone; clones share the armed-timer table and the active flag.
/// Every timer is a suspended task on the shared tokio pool resuming at its
/// due instant, so many armed jobs cost no threads.
#[derive(Clone)]
pub struct JobScheduler<R> {
    repository: R,
    dispatchers: Arc<DispatcherRegistry>,
    extractors: Arc<ExceptionExtractorRegistry>,
    sink: Arc<dyn StatusSink>,
    config: SchedulerConfig,
    timers: Arc<Mutex<HashMap<JobId, ArmedTimer>>>,
    active: Arc<AtomicBool>,
}

struct ArmedTimer {
    scheduled_id: String,
    token: CancellationToken,
}

fn new_scheduled_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl<R> JobScheduler<R>
where
    R: JobRepository + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        repository: R,
        dispatchers: Arc<DispatcherRegistry>,
        extractors: Arc<ExceptionExtractorRegistry>,
        sink: Arc<dyn StatusSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repository,
            dispatchers,
            extractors,
            sink,
            config,
            timers: Default::default(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validates and persists a new job and, on the active instance, arms its
    /// timer. Returns the stored job with status [`JobStatus::Scheduled`].
    pub async fn schedule(&self, new_job: NewJob) -> Result<JobDetails, SchedulerError> {
        validation::validate_new_job(&new_job, &self.dispatchers)?;
        let mut job = new_job.into_details();
        let fire_at = self.first_reachable_fire_time(&job.trigger)?;
        if self.is_active() {
            job.scheduled_id = Some(new_scheduled_id());
        }
        let job = self.repository.save(job).await?;
        self.sink.on_status_change(&job);
        if let Some(scheduled_id) = job.scheduled_id.clone() {
            self.arm(job.id.clone(), scheduled_id, fire_at);
        }
        tracing::debug!(job_id = %job.id, "Scheduled job {} to fire at {fire_at}", job.id);
        Ok(job)
    }

    /// Merge-style partial update restricted to trigger fields; re-arms the
    /// timer for the new fire instant.
    pub async fn reschedule(
        &self,
        id: &JobId,
        patch: JobPatch,
    ) -> Result<JobDetails, SchedulerError> {
        validation::validate_patch(&patch)?;
        let mut job = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;
        if job.status.is_terminal() {
            return Err(SchedulerError::NotFound(id.clone()));
        }
        job.trigger = patch.trigger.ok_or(ValidationError::EmptyPatch)?;
        let fire_at = self.first_reachable_fire_time(&job.trigger)?;
        let scheduled_id = self.is_active().then(new_scheduled_id);
        job.scheduled_id = scheduled_id.clone();
        let job = self.repository.update(job).await.map_err(not_found)?;
        self.sink.on_status_change(&job);
        match scheduled_id {
            Some(scheduled_id) => self.arm(job.id.clone(), scheduled_id, fire_at),
            None => self.disarm(id),
        }
        tracing::debug!(job_id = %id, "Rescheduled job {id} to fire at {fire_at}");
        Ok(job)
    }

    /// Cancels the pending timer and removes the job.
    ///
    /// Fails with [`SchedulerError::NotFound`] if the job is unknown, already
    /// terminal, or currently claimed by an in-flight dispatch — the claim is
    /// the mutual-exclusion point, so losing that race leaves the dispatch
    /// outcome in charge.
    pub async fn cancel(&self, id: &JobId) -> Result<JobDetails, SchedulerError> {
        self.disarm(id);
        let Some(mut job) = self.repository.try_claim(id).await? else {
            return Err(SchedulerError::NotFound(id.clone()));
        };
        job.status = JobStatus::Canceled;
        job.scheduled_id = None;
        self.sink.on_status_change(&job);
        self.repository.delete(id).await?;
        tracing::debug!(job_id = %id, "Canceled job {id}");
        Ok(job)
    }

    pub async fn get(&self, id: &JobId) -> Result<JobDetails, SchedulerError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))
    }

    /// Caller deletion: disarms and removes whatever state the job was in.
    pub async fn delete(&self, id: &JobId) -> Result<Option<JobDetails>, SchedulerError> {
        self.disarm(id);
        Ok(self.repository.delete(id).await?)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub(crate) fn repository(&self) -> &R {
        &self.repository
    }

    /// Arms a timer for a job loaded from the repository during recovery.
    /// Jobs that already have a timer are left alone.
    pub(crate) fn arm_recovered(&self, job: &JobDetails) {
        let Some(fire_at) = job.trigger.next_fire_time() else {
            return;
        };
        if self.timers().contains_key(&job.id) {
            return;
        }
        let scheduled_id = job.scheduled_id.clone().unwrap_or_else(new_scheduled_id);
        tracing::debug!(job_id = %job.id, "Re-arming recovered job {} for {fire_at}", job.id);
        self.arm(job.id.clone(), scheduled_id, fire_at);
    }

    /// Cancels every pending timer. Occurrences already claimed keep running.
    pub(crate) fn disarm_all(&self) {
        for (_, timer) in self.timers().drain() {
            timer.token.cancel();
        }
    }

    fn first_reachable_fire_time(&self, trigger: &Trigger) -> Result<DateTime<Utc>, SchedulerError> {
        let Some(fire_at) = trigger.next_fire_time() else {
            return Err(SchedulerError::InvalidScheduleTime(None));
        };
        if fire_at < Utc::now() - self.config.schedule_tolerance {
            return Err(SchedulerError::InvalidScheduleTime(Some(fire_at)));
        }
        Ok(fire_at)
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<JobId, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self, id: JobId, scheduled_id: String, fire_at: DateTime<Utc>) {
        if !self.is_active() {
            tracing::debug!(job_id = %id, "Not arming a timer for job {id} while passive");
            return;
        }
        let token = CancellationToken::new();
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if let Some(previous) = self.timers().insert(
            id.clone(),
            ArmedTimer {
                scheduled_id: scheduled_id.clone(),
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    scheduler.on_timer_fire(id, scheduled_id).await;
                }
            }
        });
    }

    fn disarm(&self, id: &JobId) {
        if let Some(timer) = self.timers().remove(id) {
            timer.token.cancel();
        }
    }

    async fn on_timer_fire(&self, id: JobId, scheduled_id: String) {
        {
            let mut timers = self.timers();
            if timers
                .get(&id)
                .is_some_and(|timer| timer.scheduled_id == scheduled_id)
            {
                timers.remove(&id);
            }
        }
        let job = match self.repository.try_claim(&id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Another owner handled it or it was canceled; expected.
                tracing::debug!(job_id = %id, "Dropping fire request for job {id}");
                return;
            }
            Err(err) => {
                tracing::error!(?err, job_id = %id, "Failed to claim job {id}: {err}");
                return;
            }
        };
        self.sink.on_status_change(&job);
        let timeout = job
            .execution_timeout
            .unwrap_or(self.config.default_execution_timeout);
        tracing::debug!(job_id = %id, "Executing job {id}");
        match self.dispatchers.dispatch(&job, timeout).await {
            Ok(_response) => self.complete_occurrence(job).await,
            Err(error) => self.handle_dispatch_failure(job, error).await,
        }
    }

    async fn complete_occurrence(&self, mut job: JobDetails) {
        job.execution_counter += 1;
        job.retries = 0;
        job.last_exception = None;
        job.trigger
            .advance(Utc::now(), self.config.missed_fire_policy);
        match job.trigger.next_fire_time() {
            Some(fire_at) => {
                job.status = JobStatus::Scheduled;
                let scheduled_id = new_scheduled_id();
                job.scheduled_id = Some(scheduled_id.clone());
                let id = job.id.clone();
                match self.repository.update(job).await {
                    Ok(saved) => {
                        self.sink.on_status_change(&saved);
                        self.arm(saved.id.clone(), scheduled_id, fire_at);
                        tracing::debug!(job_id = %id, "Job {id} rescheduled for {fire_at}");
                    }
                    Err(err) => self.fail_closed(id, err).await,
                }
            }
            None => {
                job.status = JobStatus::Executed;
                job.scheduled_id = None;
                let id = job.id.clone();
                tracing::debug!(job_id = %id, "Job {id} executed");
                match self.repository.update(job).await {
                    Ok(saved) => {
                        self.sink.on_status_change(&saved);
                        // Exhausted jobs are removed; ERROR jobs stay for
                        // operator inspection.
                        let _ = self.repository.delete(&id).await.inspect_err(|err| {
                            tracing::error!(?err, job_id = %id, "Failed to remove executed job {id}: {err}")
                        });
                    }
                    Err(RepositoryError::JobNotFound(_)) => {}
                    Err(err) => self.fail_closed(id, err).await,
                }
            }
        }
    }

    /// A claim succeeded but persisting the follow-up transition failed. Fail
    /// closed: push the job through the retry path so it cannot be leaked in
    /// RUNNING.
    async fn fail_closed(&self, id: JobId, err: RepositoryError) {
        tracing::error!(?err, job_id = %id, "Failed to persist transition for job {id}: {err}");
        match self.repository.get(&id).await {
            Ok(Some(job)) => {
                self.handle_dispatch_failure(
                    job,
                    DispatchError::Transport(format!("persistence failure: {err}")),
                )
                .await
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(?err, job_id = %id, "Failed to reload job {id} after persistence failure: {err}")
            }
        }
    }

    async fn handle_dispatch_failure(&self, mut job: JobDetails, error: DispatchError) {
        job.retries += 1;
        if self.config.capture_exception_details {
            job.last_exception = self.extractors.extract(&error);
        }
        let job_id = job.id.clone();
        if job.retries <= self.config.max_retries {
            let delay = self.config.retry_strategy.backoff(job.retries);
            let fire_at = Utc::now() + delay;
            job.status = JobStatus::Retry;
            let scheduled_id = new_scheduled_id();
            job.scheduled_id = Some(scheduled_id.clone());
            tracing::warn!(
                job_id = %job_id,
                "Job {job_id} failed and will be retried in {delay}: {error}"
            );
            match self.repository.update(job).await {
                Ok(saved) => {
                    self.sink.on_status_change(&saved);
                    self.arm(saved.id.clone(), scheduled_id, fire_at);
                }
                Err(RepositoryError::JobNotFound(_)) => {}
                Err(err) => {
                    tracing::error!(?err, job_id = %job_id, "Failed to mark job {job_id} as retryable: {err}")
                }
            }
        } else {
            job.status = JobStatus::Error;
            job.scheduled_id = None;
            tracing::error!(
                job_id = %job_id,
                "Job {job_id} failed and exceeded the retry ceiling: {error}"
            );
            match self.repository.update(job).await {
                Ok(saved) => self.sink.on_status_change(&saved),
                Err(RepositoryError::JobNotFound(_)) => {}
                Err(err) => {
                    tracing::error!(?err, job_id = %job_id, "Failed to mark job {job_id} as errored: {err}")
                }
            }
        }
    }
}

fn not_found(err: RepositoryError) -> SchedulerError {
    match err {
        RepositoryError::JobNotFound(id) => SchedulerError::NotFound(id),
        other => other.into(),
    }
}
