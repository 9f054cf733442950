//! Per-book job state machine.
//!
//! A [`JobController`] owns the single client-side run of one job kind for
//! one book. It starts the job's event stream, applies frames, cancels, and
//! re-attaches to a job already running on the server through the status
//! poller.
//!
//! ```text
//! Idle --start--> Starting --stream open--> Running --completed--> Completed
//!                    |                         |-----error/EOF----> Errored
//!                    +-------cancel------------+-----cancel-------> Cancelled
//! ```
//!
//! Every transition that ends a run bumps the run generation. Stream and
//! poll tasks carry the generation they were spawned for, so late frames
//! from an abandoned connection are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use readwise_core::defaults::EVENT_CHANNEL_CAPACITY;
use readwise_core::{Error, JobKind, JobProgress, JobStatus, Result};

use crate::backend::{JobBackend, JobParams};
use crate::poller::{PollHandle, PollUpdate, StatusPoller};
use crate::transport::JobStream;

// =============================================================================
// PUBLIC STATE
// =============================================================================

/// Lifecycle phase of a job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobPhase {
    #[default]
    Idle,
    /// Request issued, no frame received yet.
    Starting,
    Running,
    Completed,
    Errored,
    Cancelled,
}

impl JobPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, JobPhase::Starting | JobPhase::Running)
    }
}

/// Observable state of a job run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub kind: JobKind,
    pub book_id: String,
    pub phase: JobPhase,
    /// Last payload applied, server-sent or synthesized locally.
    pub latest: Option<JobProgress>,
    pub cancel_requested: bool,
    /// Chapters produced, reported by translation on completion.
    pub chapter_count: Option<u32>,
}

impl JobSnapshot {
    fn idle(kind: JobKind, book_id: &str) -> Self {
        Self {
            kind,
            book_id: book_id.to_string(),
            phase: JobPhase::Idle,
            latest: None,
            cancel_requested: false,
            chapter_count: None,
        }
    }

    pub fn running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn percent(&self) -> u8 {
        self.latest.as_ref().map(JobProgress::percent).unwrap_or(0)
    }

    pub fn message(&self) -> &str {
        self.latest.as_ref().map(JobProgress::message).unwrap_or("")
    }

    pub fn can_cancel(&self) -> bool {
        self.running()
    }

    /// A stopped run that a new start would retry or resume.
    pub fn can_retry(&self) -> bool {
        matches!(self.phase, JobPhase::Errored | JobPhase::Cancelled)
            || self.latest.as_ref().map(|p| &p.status) == Some(&JobStatus::Extracted)
            || self.latest.as_ref().map(|p| &p.status) == Some(&JobStatus::Stopped)
    }
}

/// Job lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        kind: JobKind,
        book_id: String,
    },
    Progress {
        kind: JobKind,
        book_id: String,
        progress: JobProgress,
    },
    /// Emitted exactly once per completed run.
    Completed {
        kind: JobKind,
        book_id: String,
        progress: JobProgress,
    },
    Failed {
        kind: JobKind,
        book_id: String,
        message: String,
    },
    Cancelled {
        kind: JobKind,
        book_id: String,
    },
}

impl JobEvent {
    pub fn kind(&self) -> JobKind {
        match self {
            JobEvent::Started { kind, .. }
            | JobEvent::Progress { kind, .. }
            | JobEvent::Completed { kind, .. }
            | JobEvent::Failed { kind, .. }
            | JobEvent::Cancelled { kind, .. } => *kind,
        }
    }

    pub fn book_id(&self) -> &str {
        match self {
            JobEvent::Started { book_id, .. }
            | JobEvent::Progress { book_id, .. }
            | JobEvent::Completed { book_id, .. }
            | JobEvent::Failed { book_id, .. }
            | JobEvent::Cancelled { book_id, .. } => book_id,
        }
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Default)]
struct JobRun {
    phase: JobPhase,
    latest: Option<JobProgress>,
    cancel_requested: bool,
    chapter_count: Option<u32>,
    generation: u64,
    stream_cancel: Option<CancellationToken>,
    stream_task: Option<TaskGuard>,
    poll: Option<PollHandle>,
}

impl JobRun {
    fn running(&self) -> bool {
        self.phase.is_running()
    }

    /// Drop the stream and poll loop and invalidate their pending updates.
    fn release(&mut self) {
        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
        }
        self.stream_task = None;
        self.poll = None;
        self.generation += 1;
    }

    fn clear(&mut self) {
        self.phase = JobPhase::Idle;
        self.latest = None;
        self.cancel_requested = false;
        self.chapter_count = None;
    }

    fn last_percent(&self) -> f64 {
        self.latest.as_ref().map(|p| p.progress).unwrap_or(0.0)
    }
}

struct Inner<B: JobBackend> {
    kind: JobKind,
    book_id: String,
    backend: Arc<B>,
    poll_interval: Duration,
    run: Mutex<JobRun>,
    state_tx: watch::Sender<JobSnapshot>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl<B: JobBackend> Inner<B> {
    fn lock(&self) -> MutexGuard<'_, JobRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, run: &JobRun) -> JobSnapshot {
        JobSnapshot {
            kind: self.kind,
            book_id: self.book_id.clone(),
            phase: run.phase,
            latest: run.latest.clone(),
            cancel_requested: run.cancel_requested,
            chapter_count: run.chapter_count,
        }
    }

    /// Publish state and an optional event. Called with the run locked so
    /// observers see transitions in order.
    fn commit(&self, run: &JobRun, event: Option<JobEvent>) {
        self.state_tx.send_replace(self.snapshot(run));
        if let Some(event) = event {
            let _ = self.event_tx.send(event);
        }
    }

    fn book_id(&self) -> String {
        self.book_id.clone()
    }

    /// Phase a status settles the run into, `None` while still in flight.
    fn settle_phase(&self, status: &JobStatus) -> Option<JobPhase> {
        match status {
            JobStatus::Completed => Some(JobPhase::Completed),
            JobStatus::Error => Some(JobPhase::Errored),
            JobStatus::Cancelled => Some(JobPhase::Cancelled),
            JobStatus::Stopped => {
                warn!(
                    kind = %self.kind,
                    book_id = %self.book_id,
                    "Server reported 'stopped', treating as cancelled"
                );
                Some(JobPhase::Cancelled)
            }
            JobStatus::Idle => Some(JobPhase::Idle),
            _ => None,
        }
    }

    /// Apply a server payload. Returns the event to publish and whether the
    /// run settled.
    fn apply(&self, run: &mut JobRun, progress: JobProgress) -> (Option<JobEvent>, bool) {
        if let Some(count) = progress.chapter_count {
            run.chapter_count = Some(count);
        }

        let Some(phase) = self.settle_phase(&progress.status) else {
            run.phase = JobPhase::Running;
            run.latest = Some(progress.clone());
            let event = JobEvent::Progress {
                kind: self.kind,
                book_id: self.book_id(),
                progress,
            };
            return (Some(event), false);
        };

        run.phase = phase;
        run.latest = Some(progress.clone());
        run.release();

        let event = match phase {
            JobPhase::Completed => {
                info!(
                    kind = %self.kind,
                    book_id = %self.book_id,
                    chapter_count = ?run.chapter_count,
                    "Job completed"
                );
                Some(JobEvent::Completed {
                    kind: self.kind,
                    book_id: self.book_id(),
                    progress,
                })
            }
            JobPhase::Errored => {
                let message = match progress.message() {
                    "" => format!("{} failed", self.kind.label()),
                    m => m.to_string(),
                };
                warn!(
                    kind = %self.kind,
                    book_id = %self.book_id,
                    error = %Error::Job(message.clone()),
                    "Job failed"
                );
                Some(JobEvent::Failed {
                    kind: self.kind,
                    book_id: self.book_id(),
                    message,
                })
            }
            JobPhase::Cancelled => Some(JobEvent::Cancelled {
                kind: self.kind,
                book_id: self.book_id(),
            }),
            _ => None,
        };
        (event, true)
    }

    fn on_stream_item(&self, generation: u64, progress: JobProgress) -> bool {
        let mut run = self.lock();
        if run.generation != generation || !run.running() {
            return false;
        }
        let (event, settled) = self.apply(&mut run, progress);
        self.commit(&run, event);
        !settled
    }

    fn on_stream_end(&self, generation: u64, error: Option<Error>) {
        let mut run = self.lock();
        if run.generation != generation || !run.running() || run.cancel_requested {
            return;
        }

        let message = match error {
            Some(e) => e.to_string(),
            None => format!(
                "{} stream closed before the job finished",
                self.kind.label()
            ),
        };
        warn!(kind = %self.kind, book_id = %self.book_id, error = %message, "Job stream ended");

        let mut failed = JobProgress::failed(message.clone());
        failed.progress = run.last_percent();
        run.phase = JobPhase::Errored;
        run.latest = Some(failed);
        run.release();

        let event = JobEvent::Failed {
            kind: self.kind,
            book_id: self.book_id(),
            message,
        };
        self.commit(&run, Some(event));
    }

    fn on_poll(&self, generation: u64, update: PollUpdate) -> bool {
        let mut run = self.lock();
        if run.generation != generation || !run.running() {
            return false;
        }
        match update {
            PollUpdate::Status(progress) => {
                let (event, settled) = self.apply(&mut run, progress);
                self.commit(&run, event);
                !settled
            }
            PollUpdate::Failed(_) => {
                // last known status stays visible
                run.phase = JobPhase::Idle;
                run.release();
                self.commit(&run, None);
                false
            }
        }
    }
}

async fn drive<B: JobBackend>(
    inner: Weak<Inner<B>>,
    generation: u64,
    mut stream: JobStream<JobProgress>,
) {
    while let Some(item) = stream.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match item {
            Ok(progress) => {
                if !inner.on_stream_item(generation, progress) {
                    return;
                }
            }
            Err(e) => {
                inner.on_stream_end(generation, Some(e));
                return;
            }
        }
    }
    if let Some(inner) = inner.upgrade() {
        inner.on_stream_end(generation, None);
    }
}

/// Best-effort backend cancel. The local state does not depend on it.
async fn send_cancel<B: JobBackend>(backend: Arc<B>, kind: JobKind, book_id: String) {
    match backend.cancel_job(kind, &book_id).await {
        Ok(()) => debug!(%kind, %book_id, "Backend cancel acknowledged"),
        Err(e) => {
            let err = Error::Cancel(e.to_string());
            warn!(%kind, %book_id, error = %err, "Backend cancel failed");
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Client-side run of one job kind for one book.
///
/// Cheap to clone; clones share the run.
pub struct JobController<B: JobBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: JobBackend> Clone for JobController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: JobBackend> JobController<B> {
    pub fn new(
        backend: Arc<B>,
        kind: JobKind,
        book_id: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let book_id = book_id.into();
        let (state_tx, _) = watch::channel(JobSnapshot::idle(kind, &book_id));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                kind,
                book_id,
                backend,
                poll_interval,
                run: Mutex::new(JobRun::default()),
                state_tx,
                event_tx,
            }),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.inner.kind
    }

    pub fn book_id(&self) -> &str {
        &self.inner.book_id
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.inner.snapshot(&self.inner.lock())
    }

    /// Watch the run state.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.inner.state_tx.subscribe()
    }

    /// Receive lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Start the job and follow its event stream.
    ///
    /// Returns once the stream is open. Fails with
    /// [`Error::JobAlreadyRunning`] while a run is in flight and with
    /// [`Error::InvalidState`] after completion until [`reset`](Self::reset).
    pub async fn start(&self, params: JobParams) -> Result<()> {
        let inner = &self.inner;
        if params.kind() != inner.kind {
            return Err(Error::InvalidInput(format!(
                "Cannot start a {} job on the {} controller",
                params.kind(),
                inner.kind
            )));
        }
        params.validate()?;

        let (generation, token) = {
            let mut run = inner.lock();
            if run.running() {
                return Err(Error::JobAlreadyRunning {
                    kind: inner.kind.to_string(),
                    book_id: inner.book_id(),
                });
            }
            if run.phase == JobPhase::Completed {
                return Err(Error::InvalidState(format!(
                    "{} already completed for book {}",
                    inner.kind.label(),
                    inner.book_id
                )));
            }

            run.release();
            run.clear();
            run.phase = JobPhase::Starting;
            let token = CancellationToken::new();
            run.stream_cancel = Some(token.clone());

            let event = JobEvent::Started {
                kind: inner.kind,
                book_id: inner.book_id(),
            };
            inner.commit(&run, Some(event));
            (run.generation, token)
        };

        info!(kind = %inner.kind, book_id = %inner.book_id, "Starting job");
        let opened = inner
            .backend
            .open_job(&inner.book_id, &params, token)
            .await;

        let mut run = inner.lock();
        if run.generation != generation || run.phase != JobPhase::Starting {
            debug!(kind = %inner.kind, book_id = %inner.book_id, "Start superseded");
            return Ok(());
        }

        match opened {
            Ok(stream) => {
                run.phase = JobPhase::Running;
                let task = tokio::spawn(drive(Arc::downgrade(inner), generation, stream));
                run.stream_task = Some(TaskGuard(task));
                inner.commit(&run, None);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    kind = %inner.kind,
                    book_id = %inner.book_id,
                    error = %e,
                    "Job failed to start"
                );
                run.phase = JobPhase::Errored;
                run.latest = Some(JobProgress::failed(message.clone()));
                run.release();
                let event = JobEvent::Failed {
                    kind: inner.kind,
                    book_id: inner.book_id(),
                    message,
                };
                inner.commit(&run, Some(event));
                Err(e)
            }
        }
    }

    /// Cancel the run.
    ///
    /// The local state is `Cancelled` when this returns. The backend cancel
    /// is sent in the background and its failure is only logged.
    pub fn cancel(&self) -> Result<()> {
        let inner = &self.inner;
        self.mark_cancelled()?;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                kind = %inner.kind,
                book_id = %inner.book_id,
                "No runtime, backend cancel not sent"
            );
            return Ok(());
        };
        handle.spawn(send_cancel(
            inner.backend.clone(),
            inner.kind,
            inner.book_id(),
        ));
        Ok(())
    }

    /// Cancel the run and wait for the backend cancel to return.
    ///
    /// Same transition as [`cancel`](Self::cancel). For callers about to
    /// exit, where a background request would be dropped with the runtime.
    pub async fn cancel_and_wait(&self) -> Result<()> {
        let inner = &self.inner;
        self.mark_cancelled()?;
        send_cancel(inner.backend.clone(), inner.kind, inner.book_id()).await;
        Ok(())
    }

    fn mark_cancelled(&self) -> Result<()> {
        let inner = &self.inner;
        let mut run = inner.lock();
        if !run.running() {
            return Err(Error::InvalidState(format!(
                "No {} running for book {}",
                inner.kind, inner.book_id
            )));
        }
        let progress = JobProgress::cancelled(
            run.last_percent(),
            format!("{} cancelled", inner.kind.label()),
        );
        run.cancel_requested = true;
        run.phase = JobPhase::Cancelled;
        run.latest = Some(progress);
        run.release();

        let event = JobEvent::Cancelled {
            kind: inner.kind,
            book_id: inner.book_id(),
        };
        inner.commit(&run, Some(event));
        info!(kind = %inner.kind, book_id = %inner.book_id, "Job cancelled");
        Ok(())
    }

    /// Pick up a job already running on the server.
    ///
    /// Fetches the status once. An in-flight job is followed by polling
    /// until it settles; otherwise the last server status is shown. While
    /// a start or a live stream owns the run this is a no-op.
    pub async fn attach(&self) -> Result<JobSnapshot> {
        let inner = &self.inner;
        let (generation, previous) = {
            let mut run = inner.lock();
            // a start in flight or a live stream owns the run
            if run.stream_cancel.is_some() {
                return Ok(inner.snapshot(&run));
            }
            let previous = run.poll.take();
            run.release();
            (run.generation, previous)
        };
        // the old loop's fetch must be gone before ours goes out
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        let poller = StatusPoller::new(
            inner.backend.clone(),
            inner.kind,
            inner.book_id(),
            inner.poll_interval,
        );
        let fetched = poller.fetch().await;

        let mut run = inner.lock();
        if run.generation != generation {
            return Ok(inner.snapshot(&run));
        }

        let status = match fetched {
            Ok(status) => status,
            Err(e) => {
                debug!(
                    kind = %inner.kind,
                    book_id = %inner.book_id,
                    error = %e,
                    "No job status available"
                );
                if run.running() {
                    run.phase = JobPhase::Idle;
                    inner.commit(&run, None);
                }
                return Err(e);
            }
        };

        if status.status.is_active() {
            info!(
                kind = %inner.kind,
                book_id = %inner.book_id,
                status = %status.status,
                "Attaching to running job"
            );
            run.phase = JobPhase::Running;
            run.cancel_requested = false;
            if let Some(count) = status.chapter_count {
                run.chapter_count = Some(count);
            }
            run.latest = Some(status.clone());

            let weak = Arc::downgrade(inner);
            run.poll = Some(poller.watch(move |update| match weak.upgrade() {
                Some(inner) => inner.on_poll(generation, update),
                None => false,
            }));

            let event = JobEvent::Progress {
                kind: inner.kind,
                book_id: inner.book_id(),
                progress: status,
            };
            inner.commit(&run, Some(event));
        } else if run.running() && status.status.is_settled() {
            // the retained run ended while detached
            let (event, _) = inner.apply(&mut run, status);
            inner.commit(&run, event);
        } else {
            run.phase = JobPhase::Idle;
            run.cancel_requested = false;
            run.latest = (status.status != JobStatus::Idle).then_some(status);
            inner.commit(&run, None);
        }
        Ok(inner.snapshot(&run))
    }

    /// Stop following the run without cancelling it on the server.
    ///
    /// A running run keeps its last state so a later
    /// [`attach`](Self::attach) can resume tracking. Anything else resets,
    /// including a start still waiting for its stream to open.
    pub fn detach(&self) {
        let inner = &self.inner;
        let mut run = inner.lock();
        run.release();
        if run.phase != JobPhase::Running {
            run.clear();
        }
        debug!(kind = %inner.kind, book_id = %inner.book_id, "Detached");
        inner.commit(&run, None);
    }

    /// Return a finished run to `Idle`.
    pub fn reset(&self) -> Result<()> {
        let inner = &self.inner;
        let mut run = inner.lock();
        if run.running() {
            return Err(Error::InvalidState(format!(
                "{} still running for book {}",
                inner.kind.label(),
                inner.book_id
            )));
        }
        run.release();
        run.clear();
        inner.commit(&run, None);
        Ok(())
    }

    /// Wait until the run is no longer in flight.
    pub async fn settled(&self) -> JobSnapshot {
        let mut rx = self.subscribe();
        let snapshot = match rx.wait_for(|s| !s.running()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }
}
