//! Periodic job status polling.
//!
//! Used to pick up a job that is already running on the server, for example
//! after the view that started it was closed and reopened.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use readwise_core::{Error, JobKind, JobProgress, Result};

use crate::backend::StatusSource;

/// Update delivered by a running poll loop.
#[derive(Debug)]
pub enum PollUpdate {
    Status(JobProgress),
    /// A fetch failed. The loop has stopped.
    Failed(Error),
}

/// Status poller for one book and job kind.
pub struct StatusPoller<S: StatusSource> {
    source: Arc<S>,
    kind: JobKind,
    book_id: String,
    interval: Duration,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(
        source: Arc<S>,
        kind: JobKind,
        book_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            kind,
            book_id: book_id.into(),
            interval,
        }
    }

    /// One status fetch.
    pub async fn fetch(&self) -> Result<JobProgress> {
        self.source.job_status(self.kind, &self.book_id).await
    }

    /// Poll every interval until the status settles, a fetch fails, or the
    /// handle is dropped.
    ///
    /// `on_update` returns `false` to stop the loop early. Fetches never
    /// overlap: the next one is scheduled only after the previous returns.
    pub fn watch<F>(self, mut on_update: F) -> PollHandle
    where
        F: FnMut(PollUpdate) -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }

                let result = tokio::select! {
                    _ = child.cancelled() => break,
                    result = self.fetch() => result,
                };

                match result {
                    Ok(progress) => {
                        let settled = progress.status.is_settled();
                        debug!(
                            kind = %self.kind,
                            book_id = %self.book_id,
                            status = %progress.status,
                            "Polled job status"
                        );
                        if !on_update(PollUpdate::Status(progress)) || settled {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            kind = %self.kind,
                            book_id = %self.book_id,
                            error = %e,
                            "Status poll failed, stopping"
                        );
                        on_update(PollUpdate::Failed(e));
                        break;
                    }
                }
            }
        });

        PollHandle { token, task }
    }
}

/// Running poll loop. Dropping the handle stops it.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.token.cancel();
        self.task.abort();
    }

    /// Stop the loop and wait until any fetch it had in flight is dropped.
    pub async fn shutdown(mut self) {
        self.stop();
        let _ = (&mut self.task).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use readwise_core::JobStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Scripted {
        replies: Mutex<VecDeque<Result<JobProgress>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<JobProgress>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusSource for Scripted {
        async fn job_status(&self, _kind: JobKind, _book_id: &str) -> Result<JobProgress> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(JobProgress::new(JobStatus::Extracting, 50.0, "")))
        }
    }

    fn progress(status: JobStatus, pct: f64) -> Result<JobProgress> {
        Ok(JobProgress::new(status, pct, ""))
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_at_settled_status() {
        let source = Scripted::new(vec![
            progress(JobStatus::Extracting, 40.0),
            progress(JobStatus::Splitting, 85.0),
            progress(JobStatus::Completed, 100.0),
        ]);
        let poller = StatusPoller::new(
            source.clone(),
            JobKind::Extraction,
            "b",
            Duration::from_secs(1),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = poller.watch(move |u| {
            let _ = tx.send(u);
            true
        });

        let mut statuses = Vec::new();
        while let Some(PollUpdate::Status(p)) = rx.recv().await {
            statuses.push(p.status);
        }
        assert_eq!(
            statuses,
            vec![JobStatus::Extracting, JobStatus::Splitting, JobStatus::Completed]
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        tokio::task::yield_now().await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_stops_loop() {
        let source = Scripted::new(vec![
            progress(JobStatus::Extracting, 10.0),
            Err(Error::Transport("refused".into())),
        ]);
        let poller = StatusPoller::new(
            source.clone(),
            JobKind::Extraction,
            "b",
            Duration::from_secs(1),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = poller.watch(move |u| {
            let _ = tx.send(u);
            true
        });

        assert!(matches!(rx.recv().await, Some(PollUpdate::Status(_))));
        assert!(matches!(rx.recv().await, Some(PollUpdate::Failed(_))));
        assert!(rx.recv().await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_handle_stops_polling() {
        let source = Scripted::new(vec![]);
        let poller = StatusPoller::new(
            source.clone(),
            JobKind::Extraction,
            "b",
            Duration::from_secs(1),
        );
        let handle = poller.watch(|_| true);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let seen = source.calls.load(Ordering::SeqCst);
        assert_eq!(seen, 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_loop_exit() {
        let source = Scripted::new(vec![]);
        let poller = StatusPoller::new(
            source.clone(),
            JobKind::Extraction,
            "b",
            Duration::from_secs(1),
        );
        let handle = poller.watch(|_| true);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_stop_loop() {
        let source = Scripted::new(vec![]);
        let poller = StatusPoller::new(
            source.clone(),
            JobKind::Extraction,
            "b",
            Duration::from_secs(1),
        );
        let _handle = poller.watch(|_| false);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
