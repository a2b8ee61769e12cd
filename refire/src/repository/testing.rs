//! Test suite for ensuring a correct implementation of a [`JobRepository`].

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    job::{JobDetails, JobId, JobStatus, Recipient},
    trigger::Trigger,
};

use super::JobRepository;

fn suite_job(id: &str, fire_at: DateTime<Utc>) -> JobDetails {
    JobDetails {
        id: JobId::from(id),
        correlation_id: None,
        status: JobStatus::Scheduled,
        trigger: Trigger::point_in_time(fire_at),
        recipient: Recipient::http("http://localhost:8080/callback"),
        priority: 0,
        retries: 0,
        execution_counter: 0,
        execution_timeout: None,
        created: None,
        last_update: None,
        scheduled_id: None,
        last_exception: None,
    }
}

pub async fn save_stamps_audit_fields(repository: impl JobRepository) {
    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();

    assert!(stored.created.is_some());
    assert!(stored.last_update.is_some());

    let fetched = repository.get(&stored.id).await.unwrap().unwrap();
    assert_eq!(fetched, stored);
}

pub async fn save_is_an_upsert_preserving_created(repository: impl JobRepository) {
    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();

    let mut replacement = suite_job("job-1", Utc::now() + TimeDelta::minutes(1));
    replacement.priority = 7;
    let replaced = repository.save(replacement).await.unwrap();

    assert_eq!(replaced.created, stored.created);
    assert_eq!(replaced.priority, 7);
    assert_eq!(
        repository.get(&stored.id).await.unwrap().unwrap().priority,
        7
    );
}

pub async fn get_returns_none_for_unknown_ids(repository: impl JobRepository) {
    assert!(repository
        .get(&JobId::from("missing"))
        .await
        .unwrap()
        .is_none());
}

pub async fn exists_reflects_contents(repository: impl JobRepository) {
    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();

    assert!(repository.exists(&stored.id).await.unwrap());
    assert!(!repository.exists(&JobId::from("missing")).await.unwrap());

    repository.delete(&stored.id).await.unwrap();
    assert!(!repository.exists(&stored.id).await.unwrap());
}

pub async fn update_requires_an_existing_job(repository: impl JobRepository) {
    let result = repository.update(suite_job("missing", Utc::now())).await;
    assert!(matches!(
        result,
        Err(super::RepositoryError::JobNotFound(_))
    ));

    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();
    let mut changed = stored.clone();
    changed.retries = 2;
    let updated = repository.update(changed).await.unwrap();

    assert_eq!(updated.retries, 2);
    assert_eq!(updated.created, stored.created);
}

pub async fn delete_returns_the_last_snapshot(repository: impl JobRepository) {
    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();

    let deleted = repository.delete(&stored.id).await.unwrap();
    assert_eq!(deleted, Some(stored.clone()));
    assert_eq!(repository.delete(&stored.id).await.unwrap(), None);
}

pub async fn try_claim_grants_at_most_one_of_two_racers(repository: impl JobRepository) {
    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();

    let (first, second) = futures::join!(
        repository.try_claim(&stored.id),
        repository.try_claim(&stored.id)
    );
    let claimed = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, JobStatus::Running);
    assert_eq!(
        repository.get(&stored.id).await.unwrap().unwrap().status,
        JobStatus::Running
    );
}

pub async fn try_claim_refuses_unclaimable_jobs(repository: impl JobRepository) {
    assert!(repository
        .try_claim(&JobId::from("missing"))
        .await
        .unwrap()
        .is_none());

    let stored = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();
    repository.try_claim(&stored.id).await.unwrap().unwrap();

    // Already running: the second fire request must be refused.
    assert!(repository.try_claim(&stored.id).await.unwrap().is_none());

    let mut terminal = repository.get(&stored.id).await.unwrap().unwrap();
    terminal.status = JobStatus::Executed;
    repository.update(terminal).await.unwrap();
    assert!(repository.try_claim(&stored.id).await.unwrap().is_none());

    let mut retryable = repository.get(&stored.id).await.unwrap().unwrap();
    retryable.status = JobStatus::Retry;
    repository.update(retryable).await.unwrap();
    assert!(repository.try_claim(&stored.id).await.unwrap().is_some());
}

pub async fn find_by_status_filters(repository: impl JobRepository) {
    let scheduled = repository
        .save(suite_job("job-1", Utc::now()))
        .await
        .unwrap();
    let mut other = suite_job("job-2", Utc::now());
    other.status = JobStatus::Error;
    repository.save(other).await.unwrap();

    let found = repository
        .find_by_status(&[JobStatus::Scheduled, JobStatus::Retry])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, scheduled.id);

    assert_eq!(repository.find_all().await.unwrap().len(), 2);
}

pub async fn find_between_dates_is_half_open_and_ordered(repository: impl JobRepository) {
    let from = Utc::now() + TimeDelta::minutes(1);
    let to = from + TimeDelta::minutes(10);

    let mut inside_low = suite_job("b-inside", from);
    inside_low.priority = 1;
    let mut inside_high = suite_job("c-inside", from + TimeDelta::minutes(5));
    inside_high.priority = 9;
    let mut inside_tied = suite_job("a-inside", from + TimeDelta::minutes(2));
    inside_tied.priority = 1;
    let before = suite_job("before", from - TimeDelta::seconds(1));
    let at_upper_bound = suite_job("upper", to);
    let mut wrong_status = suite_job("running", from + TimeDelta::minutes(1));
    wrong_status.status = JobStatus::Running;

    for job in [
        inside_low,
        inside_high,
        inside_tied,
        before,
        at_upper_bound,
        wrong_status,
    ] {
        repository.save(job).await.unwrap();
    }

    let found = repository
        .find_by_status_between_dates(from, to, &[JobStatus::Scheduled, JobStatus::Retry])
        .await
        .unwrap();

    let ids = found.iter().map(|job| job.id.as_str()).collect::<Vec<_>>();
    // Priority descending, ties broken by id ascending.
    assert_eq!(ids, vec!["c-inside", "a-inside", "b-inside"]);
}

/// Create a test suite for a [`JobRepository`] implementation.
///
/// Backend implementors should include this as part of their test suites.
///
/// # Example
///
/// ```
/// use refire::repository_test_suite;
/// use refire::repository::memory::InMemoryRepository;
/// repository_test_suite!(for: InMemoryRepository::new());
/// ```
///
/// If using a different async test attribute, the macro can be configured to
/// use that instead:
///
/// ```ignore
/// use refire::repository_test_suite;
/// repository_test_suite!(
///     attr: sqlx::test,
///     args: (pool: PgPool),
///     repository: SqlxRepository::from_pool(pool).await.unwrap()
/// );
/// ```
#[macro_export]
macro_rules! repository_test_suite {
    (for: $repository:expr) => {
        $crate::repository_test_suite!(attr: tokio::test, args: (), repository: $repository);
    };
    (attr: $attr:meta, args: $args:tt, repository: $repository:expr) => {
        #[$attr]
        async fn save_stamps_audit_fields $args {
            let repository = $repository;
            $crate::repository::testing::save_stamps_audit_fields(repository).await;
        }
        #[$attr]
        async fn save_is_an_upsert_preserving_created $args {
            let repository = $repository;
            $crate::repository::testing::save_is_an_upsert_preserving_created(repository).await;
        }
        #[$attr]
        async fn get_returns_none_for_unknown_ids $args {
            let repository = $repository;
            $crate::repository::testing::get_returns_none_for_unknown_ids(repository).await;
        }
        #[$attr]
        async fn exists_reflects_contents $args {
            let repository = $repository;
            $crate::repository::testing::exists_reflects_contents(repository).await;
        }
        #[$attr]
        async fn update_requires_an_existing_job $args {
            let repository = $repository;
            $crate::repository::testing::update_requires_an_existing_job(repository).await;
        }
        #[$attr]
        async fn delete_returns_the_last_snapshot $args {
            let repository = $repository;
            $crate::repository::testing::delete_returns_the_last_snapshot(repository).await;
        }
        #[$attr]
        async fn try_claim_grants_at_most_one_of_two_racers $args {
            let repository = $repository;
            $crate::repository::testing::try_claim_grants_at_most_one_of_two_racers(repository)
                .await;
        }
        #[$attr]
        async fn try_claim_refuses_unclaimable_jobs $args {
            let repository = $repository;
            $crate::repository::testing::try_claim_refuses_unclaimable_jobs(repository).await;
        }
        #[$attr]
        async fn find_by_status_filters $args {
            let repository = $repository;
            $crate::repository::testing::find_by_status_filters(repository).await;
        }
        #[$attr]
        async fn find_between_dates_is_half_open_and_ordered $args {
            let repository = $repository;
            $crate::repository::testing::find_between_dates_is_half_open_and_ordered(repository)
                .await;
        }
    };
}
