//! Status-change notifications for external audit/index consumers.
//!
//! The scheduler emits one event per state transition, fire and forget:
//! delivery is at-least-once at best, consumers must tolerate duplicates and
//! gaps.

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc;

use crate::job::JobDetails;

/// Receiver of job state transitions.
///
/// Implementations must not block: the scheduler calls this inline on its
/// timer workers and never retries a failed delivery.
pub trait StatusSink: Send + Sync {
    fn on_status_change(&self, job: &JobDetails);
}

/// Sink discarding every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn on_status_change(&self, _job: &JobDetails) {}
}

/// Channel-backed sink feeding the stream returned by [`job_stream`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<JobDetails>,
}

impl StatusSink for ChannelSink {
    fn on_status_change(&self, job: &JobDetails) {
        if self.sender.send(job.clone()).is_err() {
            tracing::debug!(job_id = %job.id, "Job status stream has no consumer left");
        }
    }
}

/// A sink/stream pair: hand the sink to the service, consume transitions from
/// the stream.
///
/// The stream ends when the sink (and every clone of it) is dropped.
pub fn job_stream() -> (ChannelSink, impl Stream<Item = JobDetails>) {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let stream = stream! {
        while let Some(job) = receiver.recv().await {
            yield job;
        }
    };
    (ChannelSink { sender }, stream)
}
