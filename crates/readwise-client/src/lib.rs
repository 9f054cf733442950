//! # readwise-client
//!
//! HTTP/SSE client for the readwise backend.
//!
//! This crate provides:
//! - [`ApiClient`] for every REST and streaming endpoint
//! - SSE decoding of job event streams ([`transport`])
//! - [`JobController`], the per-book state machine for extraction and
//!   translation, with status polling to re-attach to running jobs
//! - [`BookStore`], the library state shared by reader views
//! - Source editing, chapter summaries, batch generation and narration
//!   playback helpers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use readwise_client::{ApiClient, BookStore, JobParams};
//! use readwise_core::JobKind;
//!
//! # async fn run() -> readwise_core::Result<()> {
//! let store = BookStore::new(Arc::new(ApiClient::from_env()?));
//! let job = store.job("deep-work", JobKind::Extraction);
//! job.start(JobParams::Extraction).await?;
//! let done = job.settled().await;
//! println!("{:?} {}%", done.phase, done.percent());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod audio;
pub mod backend;
pub mod batch;
pub mod config;
pub mod controller;
pub mod endpoints;
pub mod languages;
pub mod poller;
pub mod source;
pub mod store;
pub mod summary;
pub mod transport;

pub use api::ApiClient;
pub use audio::{AudioPlayer, AudioSlot, AudioSource, Playlist};
pub use backend::{JobBackend, JobParams, StatusSource};
pub use batch::{BatchOutcome, BatchRun, BatchState, BatchStopper};
pub use config::ClientConfig;
pub use controller::{JobController, JobEvent, JobPhase, JobSnapshot};
pub use languages::{
    is_resume, language_label, saved_progress, translate_label, translation_status,
    translation_target,
};
pub use poller::{PollHandle, PollUpdate, StatusPoller};
pub use source::SourceDraft;
pub use store::{BookStore, LibraryState};
pub use summary::SummaryPanel;
pub use transport::{decode_stream, JobStream, JobTransport, SseDecoder, SseLine};
