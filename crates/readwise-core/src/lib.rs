//! # readwise-core
//!
//! Core types for the readwise client.
//!
//! This crate provides:
//! - Wire types for books, chapters, languages, summaries and batch progress
//! - The job status vocabulary shared by extraction and translation
//! - The error type used across the workspace
//! - Centralized defaults
//!
//! It performs no I/O.

pub mod defaults;
pub mod error;
pub mod models;
pub mod progress;

pub use error::{Error, Result};
pub use models::{
    AllSummariesStatus, BatchEventType, BatchProgress, BatchStep, Book, BookLanguages, Chapter,
    ChapterSummary, ChapterSummaryStatus, ContentBody, ErrorBody, Lang, LangFlags, LangProgress,
    ModelsConfig, Mp3Status, ResplitResult, SummaryEnvelope,
};
pub use progress::{JobKind, JobProgress, JobStatus};
