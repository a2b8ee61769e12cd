//! Convenient imports for working with the scheduling engine.

pub use crate::backoff::{BackoffStrategy, Jitter};
pub use crate::config::SchedulerConfig;
pub use crate::dispatcher::{
    http::HttpDispatcher, DispatchError, DispatcherRegistry, RecipientDispatcher,
};
pub use crate::exception::{BasicExceptionExtractor, ExceptionExtractor, ExceptionExtractorRegistry};
pub use crate::job::{
    HttpRecipient, JobDetails, JobExceptionDetails, JobExecutionResponse, JobId, JobPatch,
    JobStatus, NewJob, Recipient,
};
pub use crate::leader::LeaderCoordinator;
pub use crate::repository::{memory::InMemoryRepository, JobRepository, RepositoryError};
pub use crate::scheduler::{JobScheduler, SchedulerError};
pub use crate::stream::{job_stream, ChannelSink, NoopSink, StatusSink};
pub use crate::trigger::{IntervalTrigger, MissedFirePolicy, PointInTimeTrigger, Trigger};
pub use crate::validation::ValidationError;
pub use crate::{JobService, JobServiceBuilder};
