//! The persistence contract the scheduler recovers from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{JobDetails, JobId, JobStatus};

pub mod memory;
pub mod testing;

/// Durable store of [`JobDetails`].
///
/// Implementations must tolerate concurrent calls for different ids without
/// external locking; concurrent writes for the *same* id may resolve
/// last-writer-wins. The one operation with stronger semantics is
/// [`JobRepository::try_claim`]: it is the claim underpinning the job state
/// machine and must be atomic.
#[async_trait]
pub trait JobRepository {
    /// Inserts or replaces the job, stamping `last_update` (and `created` on
    /// first insert). Returns the stored snapshot.
    async fn save(&self, job: JobDetails) -> Result<JobDetails, RepositoryError>;

    async fn get(&self, id: &JobId) -> Result<Option<JobDetails>, RepositoryError>;

    async fn exists(&self, id: &JobId) -> Result<bool, RepositoryError>;

    /// Replaces an existing job, stamping `last_update`. Fails with
    /// [`RepositoryError::JobNotFound`] if the id is unknown.
    async fn update(&self, job: JobDetails) -> Result<JobDetails, RepositoryError>;

    /// Removes the job, returning the last stored snapshot if it existed.
    async fn delete(&self, id: &JobId) -> Result<Option<JobDetails>, RepositoryError>;

    /// The claim: atomically flips the job to [`JobStatus::Running`] if its
    /// current status is claimable, returning the updated snapshot.
    ///
    /// Returns [`None`] when the job is missing or not claimable; given
    /// concurrent calls for the same id, at most one receives the job.
    async fn try_claim(&self, id: &JobId) -> Result<Option<JobDetails>, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<JobDetails>, RepositoryError>;

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDetails>, RepositoryError>;

    /// Jobs in one of `statuses` whose next fire instant lies in `[from, to)`,
    /// ordered by `priority` descending with ties broken by lexicographic `id`
    /// ascending.
    ///
    /// This is the recovery query: it lets a new leader re-arm timers for the
    /// upcoming window without loading the entire store.
    async fn find_by_status_between_dates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDetails>, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("repository in bad state")]
    BadState,
}
