use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{
        jobs::{AwaitError, QueueError},
        profiles::ProfileStoreError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Chain of messages from an error and its sources, outermost first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Profiles(#[from] ProfileStoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Job(#[from] AwaitError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Short, stable description suitable for end users.
    pub fn presentation_message(&self) -> String {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) => "Resource not found".to_string(),
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "Request could not be processed".to_string()
            }
            AppError::Job(AwaitError::Failed(err)) => err.classification(),
            AppError::Job(AwaitError::Timeout { .. }) => "Job timed out".to_string(),
            AppError::Job(AwaitError::Abandoned { .. }) | AppError::Queue(_) => {
                "Render queue unavailable".to_string()
            }
            AppError::Profiles(_) => "Profiles unavailable".to_string(),
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured".to_string(),
            AppError::Infra(InfraError::Telemetry(_)) => {
                "Logging subsystem could not start".to_string()
            }
            AppError::Infra(InfraError::Io(_)) => "I/O failure".to_string(),
            AppError::Unexpected(_) => "Unexpected error occurred".to_string(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::{JobError, KillReason, Tool};

    #[test]
    fn job_failures_present_their_classification() {
        let error = AppError::from(AwaitError::Failed(JobError::ToolKilled {
            tool: Tool::Slicer,
            reason: KillReason::Terminated,
            stderr: String::new(),
        }));
        assert_eq!(error.presentation_message(), "Process Terminated");
    }

    #[test]
    fn configuration_failures_present_as_misconfiguration() {
        let error = AppError::from(InfraError::configuration(
            "failed to load configuration: jobs.concurrency must be greater than zero",
        ));
        assert_eq!(error.presentation_message(), "Service misconfigured");
        assert!(error.to_string().contains("jobs.concurrency"));
    }

    #[test]
    fn reports_walk_the_source_chain() {
        let error = AppError::from(AwaitError::Failed(JobError::workspace(
            "/tmp/job.scad",
            std::io::Error::other("disk full"),
        )));
        let report = error.report();
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "disk full");
    }
}
