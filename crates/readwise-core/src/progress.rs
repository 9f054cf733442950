//! Job status vocabulary shared by extraction and translation.
//!
//! Both job kinds report progress with the same payload shape. Extraction
//! always carries a `status`; translation frames often carry only
//! `progress` and `message`, in which case the job is still running.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::defaults::{PROGRESS_MAX, PROGRESS_MIN};

/// Kind of long-running backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// PDF to markdown extraction followed by chapter splitting.
    Extraction,
    /// LLM translation of every chapter into the target language.
    Translation,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Extraction => "extraction",
            JobKind::Translation => "translation",
        }
    }

    /// Capitalized name for user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Extraction => "Extraction",
            JobKind::Translation => "Translation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-reported job status.
///
/// Unrecognised values decode to [`JobStatus::Unknown`] instead of failing
/// the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Idle,
    Pending,
    /// Extraction phase 1: PDF to markdown.
    Extracting,
    /// Extraction finished, splitting not yet started.
    Extracted,
    /// Extraction phase 2: chapter splitting.
    Splitting,
    /// Generic running state (translation frames without a status).
    Running,
    Completed,
    Error,
    Cancelled,
    /// Translation paused by the server. Not part of the documented
    /// translation vocabulary; treated like a user cancel.
    Stopped,
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Pending => "pending",
            JobStatus::Extracting => "extracting",
            JobStatus::Extracted => "extracted",
            JobStatus::Splitting => "splitting",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Stopped => "stopped",
            JobStatus::Unknown(s) => s,
        }
    }

    /// Statuses after which no further progress is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled | JobStatus::Stopped
        )
    }

    /// Statuses of a job that is still in flight on the server.
    ///
    /// `extracted` is a resting state: the PDF pass is done and the next
    /// `start` resumes at splitting.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Extracting | JobStatus::Splitting | JobStatus::Running
        )
    }

    /// Statuses at which a status poll stops.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || *self == JobStatus::Idle
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "idle" => JobStatus::Idle,
            "pending" => JobStatus::Pending,
            "extracting" => JobStatus::Extracting,
            "extracted" => JobStatus::Extracted,
            "splitting" => JobStatus::Splitting,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "error" => JobStatus::Error,
            "cancelled" => JobStatus::Cancelled,
            "stopped" => JobStatus::Stopped,
            _ => JobStatus::Unknown(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn running_status() -> JobStatus {
    JobStatus::Running
}

/// Progress payload of a job event or status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default = "running_status")]
    pub status: JobStatus,
    /// Raw percentage as sent by the server. Use [`JobProgress::percent`]
    /// for display.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_count: Option<u32>,
}

impl JobProgress {
    pub fn new(status: JobStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: Some(message.into()),
            current_step: None,
            chapter_count: None,
        }
    }

    /// Error payload synthesized locally for a transport failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(JobStatus::Error, 0.0, message)
    }

    /// Cancellation payload synthesized locally, keeping the last percentage.
    pub fn cancelled(progress: f64, message: impl Into<String>) -> Self {
        let mut p = Self::new(JobStatus::Cancelled, progress, message);
        p.current_step = Some("Cancelled".to_string());
        p
    }

    /// Displayed percentage, clamped to `[0, 100]`. `completed` always
    /// reads as 100.
    pub fn percent(&self) -> u8 {
        if self.status == JobStatus::Completed {
            return PROGRESS_MAX;
        }
        if !self.progress.is_finite() {
            return PROGRESS_MIN;
        }
        self.progress
            .round()
            .clamp(PROGRESS_MIN as f64, PROGRESS_MAX as f64) as u8
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
