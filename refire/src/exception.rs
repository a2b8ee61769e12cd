//! Pluggable capture of dispatch failures for observability.

use crate::{dispatcher::DispatchError, job::JobExceptionDetails};

/// Turns a dispatch failure into structured details, or declines so the next
/// extractor in the registry can try.
pub trait ExceptionExtractor: Send + Sync {
    fn extract(&self, error: &DispatchError) -> Option<JobExceptionDetails>;
}

impl<F> ExceptionExtractor for F
where
    F: Fn(&DispatchError) -> Option<JobExceptionDetails> + Send + Sync,
{
    fn extract(&self, error: &DispatchError) -> Option<JobExceptionDetails> {
        self(error)
    }
}

/// Ordered extractor list scanned linearly; the first match wins.
///
/// The default registry is empty and produces no details — capture must never
/// block a state transition, so the scheduler treats [`None`] as "nothing to
/// record".
#[derive(Default)]
pub struct ExceptionExtractorRegistry {
    extractors: Vec<Box<dyn ExceptionExtractor>>,
}

impl ExceptionExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an extractor; earlier registrations take precedence.
    pub fn with_extractor(mut self, extractor: impl ExceptionExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    pub fn extract(&self, error: &DispatchError) -> Option<JobExceptionDetails> {
        self.extractors
            .iter()
            .find_map(|extractor| extractor.extract(error))
    }
}

/// Catch-all extractor recording the failure category and display message.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicExceptionExtractor;

impl ExceptionExtractor for BasicExceptionExtractor {
    fn extract(&self, error: &DispatchError) -> Option<JobExceptionDetails> {
        let error_type = match error {
            DispatchError::Timeout(_) => "timeout",
            DispatchError::Transport(_) => "transport",
            DispatchError::Failed { .. } => "response",
            DispatchError::UnsupportedRecipient(_) => "unsupported",
        };
        Some(JobExceptionDetails {
            error_type: error_type.to_owned(),
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn the_default_registry_produces_none() {
        let registry = ExceptionExtractorRegistry::new();
        assert_eq!(
            registry.extract(&DispatchError::Timeout(Duration::from_secs(1))),
            None
        );
    }

    #[test]
    fn the_first_matching_extractor_wins() {
        let registry = ExceptionExtractorRegistry::new()
            .with_extractor(|error: &DispatchError| match error {
                DispatchError::Timeout(_) => Some(JobExceptionDetails {
                    error_type: "first".to_owned(),
                    message: "timed out".to_owned(),
                }),
                _ => None,
            })
            .with_extractor(BasicExceptionExtractor);

        let timeout = registry
            .extract(&DispatchError::Timeout(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(timeout.error_type, "first");

        let transport = registry
            .extract(&DispatchError::Transport("connection reset".to_owned()))
            .unwrap();
        assert_eq!(transport.error_type, "transport");
    }

    #[test]
    fn basic_extractor_captures_the_response_code() {
        let details = BasicExceptionExtractor
            .extract(&DispatchError::Failed {
                code: "500".to_owned(),
                message: Some("boom".to_owned()),
            })
            .unwrap();
        assert_eq!(details.error_type, "response");
        assert!(details.message.contains("500"));
    }
}
