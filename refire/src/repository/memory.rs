//! Provides an in memory implementation of [`JobRepository`].
//!
//! This is the reference backend: a correct (but not optimized)
//! implementation, suitable for single-node deployments and tests. Durable
//! backends implement the same contract against their own store.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::job::{JobDetails, JobId, JobStatus};

use super::{JobRepository, RepositoryError};

/// An in memory implementation of [`JobRepository`] over a shared map.
///
/// Every operation takes a single lock acquisition, which makes
/// [`JobRepository::try_claim`] atomic: the status check and the flip to
/// `Running` happen under one write guard.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    jobs: Arc<RwLock<HashMap<JobId, JobDetails>>>,
}

impl InMemoryRepository {
    /// Creates a new instance of [`InMemoryRepository`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryRepository {
    async fn save(&self, mut job: JobDetails) -> Result<JobDetails, RepositoryError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::BadState)?;
        job.created = jobs
            .get(&job.id)
            .and_then(|existing| existing.created)
            .or(Some(now));
        job.last_update = Some(now);
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobDetails>, RepositoryError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .get(id)
            .cloned())
    }

    async fn exists(&self, id: &JobId) -> Result<bool, RepositoryError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .contains_key(id))
    }

    async fn update(&self, mut job: JobDetails) -> Result<JobDetails, RepositoryError> {
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::BadState)?;
        match jobs.get(&job.id) {
            None => Err(RepositoryError::JobNotFound(job.id)),
            Some(existing) => {
                job.created = existing.created;
                job.last_update = Some(Utc::now());
                jobs.insert(job.id.clone(), job.clone());
                Ok(job)
            }
        }
    }

    async fn delete(&self, id: &JobId) -> Result<Option<JobDetails>, RepositoryError> {
        Ok(self
            .jobs
            .write()
            .map_err(|_| RepositoryError::BadState)?
            .remove(id))
    }

    async fn try_claim(&self, id: &JobId) -> Result<Option<JobDetails>, RepositoryError> {
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::BadState)?;
        Ok(jobs.get_mut(id).and_then(|job| {
            if job.status.is_claimable() {
                job.status = JobStatus::Running;
                job.last_update = Some(Utc::now());
                Some(job.clone())
            } else {
                None
            }
        }))
    }

    async fn find_all(&self) -> Result<Vec<JobDetails>, RepositoryError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .values()
            .cloned()
            .collect())
    }

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDetails>, RepositoryError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .values()
            .filter(|job| statuses.contains(&job.status))
            .cloned()
            .collect())
    }

    async fn find_by_status_between_dates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDetails>, RepositoryError> {
        let mut jobs = self
            .jobs
            .read()
            .map_err(|_| RepositoryError::BadState)?
            .values()
            .filter(|job| {
                statuses.contains(&job.status)
                    && job
                        .trigger
                        .next_fire_time()
                        .is_some_and(|at| at >= from && at < to)
            })
            .cloned()
            .collect::<Vec<_>>();
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(jobs)
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use crate::repository_test_suite;

    use super::*;

    repository_test_suite!(for: InMemoryRepository::new());

    #[tokio::test]
    async fn badstate_errors_after_lock_poisoning() {
        let repository = InMemoryRepository::new();
        tokio::task::spawn({
            let repository = repository.clone();
            async move {
                let _guard = repository.jobs.write();
                panic!()
            }
        })
        .await
        .unwrap_err();

        assert_matches!(
            repository.get(&JobId::from("any")).await,
            Err(RepositoryError::BadState)
        );
        assert_matches!(
            repository.find_all().await,
            Err(RepositoryError::BadState)
        );
    }
}
