//! Batch summary and narration generation for a whole book language.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use readwise_core::{AllSummariesStatus, BatchEventType, BatchProgress, Lang, Result};

use crate::api::ApiClient;
use crate::audio::AudioSource;

/// How a batch run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed {
        generated_summaries: u32,
        generated_mp3s: u32,
    },
    /// Stopped locally. Items already generated are kept by the server.
    Stopped,
    /// The stream closed or failed before a `complete` frame.
    Interrupted,
}

/// Observable batch state.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub status: Option<AllSummariesStatus>,
    pub generating: bool,
    pub latest: Option<BatchProgress>,
    /// Per-chapter failures reported during the run.
    pub errors: Vec<BatchProgress>,
    pub outcome: Option<BatchOutcome>,
}

/// Stops a running batch from another task.
#[derive(Debug, Clone)]
pub struct BatchStopper(CancellationToken);

impl BatchStopper {
    pub fn stop(&self) {
        self.0.cancel();
    }
}

/// Generate-all run for one book language.
pub struct BatchRun {
    api: Arc<ApiClient>,
    book_id: String,
    lang: Lang,
    stop: CancellationToken,
    state: BatchState,
}

impl BatchRun {
    pub fn new(api: Arc<ApiClient>, book_id: impl Into<String>, lang: Lang) -> Self {
        Self {
            api,
            book_id: book_id.into(),
            lang,
            stop: CancellationToken::new(),
            state: BatchState::default(),
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Handle that stops the next or current [`run`](Self::run).
    pub fn stopper(&self) -> BatchStopper {
        BatchStopper(self.stop.clone())
    }

    /// Refresh the per-chapter summary status.
    pub async fn status(&mut self) -> Result<&AllSummariesStatus> {
        let status = self.api.summaries_status(&self.book_id, self.lang).await?;
        Ok(self.state.status.insert(status))
    }

    /// Narration tracks of the last fetched status, in chapter order.
    pub fn narration_tracks(&self) -> Vec<AudioSource> {
        let Some(status) = self.state.status.as_ref() else {
            return Vec::new();
        };
        status
            .mp3_chapters()
            .into_iter()
            .map(|c| AudioSource {
                book_id: self.book_id.clone(),
                lang: self.lang,
                chapter: c.filename.clone(),
                url: self.api.mp3_url(&self.book_id, self.lang, &c.filename),
            })
            .collect()
    }

    /// Generate every missing summary and narration track.
    ///
    /// Chapters that already have both are skipped by the server. Each
    /// frame is passed to `on_progress`. The status is refreshed once when
    /// the run ends.
    pub async fn run<F>(&mut self, model: Option<&str>, mut on_progress: F) -> Result<BatchOutcome>
    where
        F: FnMut(&BatchProgress),
    {
        let token = self.stop.clone();
        self.state.generating = true;
        self.state.latest = None;
        self.state.errors.clear();
        self.state.outcome = None;

        info!(book_id = %self.book_id, lang = %self.lang, "Starting batch generation");
        let mut stream = match self
            .api
            .generate_all(&self.book_id, self.lang, model, token.clone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state.generating = false;
                return Err(e);
            }
        };

        let mut outcome = None;
        while let Some(item) = stream.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(book_id = %self.book_id, error = %e, "Batch stream failed");
                    break;
                }
            };
            on_progress(&frame);
            match frame.kind {
                BatchEventType::Progress => {}
                BatchEventType::Error => {
                    warn!(
                        book_id = %self.book_id,
                        chapter = ?frame.chapter,
                        message = ?frame.message,
                        "Batch item failed"
                    );
                    self.state.errors.push(frame.clone());
                }
                BatchEventType::Complete => {
                    outcome = Some(BatchOutcome::Completed {
                        generated_summaries: frame.generated_summaries.unwrap_or(0),
                        generated_mp3s: frame.generated_mp3s.unwrap_or(0),
                    });
                }
            }
            self.state.latest = Some(frame);
            if outcome.is_some() {
                break;
            }
        }
        drop(stream);

        let stopped = token.is_cancelled();
        if stopped {
            self.stop = CancellationToken::new();
        }
        let outcome = outcome.unwrap_or(if stopped {
            BatchOutcome::Stopped
        } else {
            BatchOutcome::Interrupted
        });
        info!(book_id = %self.book_id, outcome = ?outcome, "Batch generation finished");

        self.state.generating = false;
        self.state.outcome = Some(outcome.clone());
        if let Err(e) = self.status().await {
            warn!(book_id = %self.book_id, error = %e, "Failed to refresh summary status");
        }
        Ok(outcome)
    }
}
