//! Job backend traits.
//!
//! The controller and poller talk to the server through these traits so
//! their state machines can be driven by an in-process fake.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use readwise_core::{Error, JobKind, JobProgress, Lang, Result};

use crate::transport::JobStream;

// =============================================================================
// JOB PARAMETERS
// =============================================================================

/// Parameters of a job start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParams {
    /// Extract the book PDF and split chapters. Resumes at splitting when
    /// the server already holds the extracted markdown.
    Extraction,
    /// Translate every chapter into `target` with `model`.
    Translation { target: Lang, model: String },
}

impl JobParams {
    pub fn translation(target: Lang, model: impl Into<String>) -> Self {
        JobParams::Translation {
            target,
            model: model.into(),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Extraction => JobKind::Extraction,
            JobParams::Translation { .. } => JobKind::Translation,
        }
    }

    /// Reject parameters the backend would refuse.
    pub fn validate(&self) -> Result<()> {
        match self {
            JobParams::Translation { model, .. } if model.trim().is_empty() => Err(
                Error::InvalidInput("Please select a translation model".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Source of a job's current status.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    /// Current status of the `kind` job for `book_id`.
    async fn job_status(&self, kind: JobKind, book_id: &str) -> Result<JobProgress>;
}

/// Server side of a long-running job.
#[async_trait]
pub trait JobBackend: StatusSource {
    /// Open the job's event stream. `cancel` aborts the connection.
    async fn open_job(
        &self,
        book_id: &str,
        params: &JobParams,
        cancel: CancellationToken,
    ) -> Result<JobStream<JobProgress>>;

    /// Ask the server to stop the job.
    async fn cancel_job(&self, kind: JobKind, book_id: &str) -> Result<()>;
}
