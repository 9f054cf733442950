//! Library state shared by the reader views.
//!
//! One [`BookStore`] is created per session and cloned into whatever needs
//! it. It owns the book list, the open book and chapter, per-book language
//! info, and the single job controller per (book, job kind).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use readwise_core::{Book, BookLanguages, Chapter, JobKind, Result};

use crate::api::ApiClient;
use crate::controller::{JobController, JobEvent};

/// Snapshot of the library.
#[derive(Debug, Clone, Default)]
pub struct LibraryState {
    pub books: Vec<Book>,
    pub books_loading: bool,
    pub books_error: Option<String>,
    pub current_book: Option<Book>,
    pub chapters: Vec<Chapter>,
    pub chapters_loading: bool,
    pub current_chapter: Option<String>,
    pub chapter_content: Option<String>,
    pub chapter_content_loading: bool,
    pub languages: HashMap<String, BookLanguages>,
}

struct StoreInner {
    api: Arc<ApiClient>,
    state: RwLock<LibraryState>,
    jobs: Mutex<HashMap<(String, JobKind), JobController<ApiClient>>>,
}

/// Cloneable handle to the library state.
#[derive(Clone)]
pub struct BookStore {
    inner: Arc<StoreInner>,
}

impl BookStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                api,
                state: RwLock::new(LibraryState::default()),
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.inner.api
    }

    pub async fn state(&self) -> LibraryState {
        self.inner.state.read().await.clone()
    }

    pub async fn load_books(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            state.books_loading = true;
            state.books_error = None;
        }
        let result = self.inner.api.list_books().await;

        let mut state = self.inner.state.write().await;
        state.books_loading = false;
        match result {
            Ok(books) => {
                debug!(count = books.len(), "Loaded books");
                state.books = books;
                Ok(())
            }
            Err(e) => {
                state.books_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn load_book(&self, book_id: &str) -> Result<()> {
        let result = self.inner.api.get_book(book_id).await;
        let mut state = self.inner.state.write().await;
        match result {
            Ok(book) => {
                state.current_book = Some(book);
                Ok(())
            }
            Err(e) => {
                state.current_book = None;
                Err(e)
            }
        }
    }

    /// Load the chapter list. The first chapter is opened when none is.
    pub async fn load_chapters(&self, book_id: &str) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            state.chapters_loading = true;
            state.chapters.clear();
        }
        let result = self.inner.api.list_chapters(book_id).await;

        let first = {
            let mut state = self.inner.state.write().await;
            state.chapters_loading = false;
            let chapters = match result {
                Ok(chapters) => chapters,
                Err(e) => {
                    state.chapters.clear();
                    return Err(e);
                }
            };
            let first = match state.current_chapter {
                None => chapters.first().map(|c| c.filename.clone()),
                Some(_) => None,
            };
            state.chapters = chapters;
            first
        };

        if let Some(file) = first {
            self.load_chapter_content(book_id, &file).await?;
        }
        Ok(())
    }

    pub async fn load_chapter_content(&self, book_id: &str, file: &str) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            state.current_chapter = Some(file.to_string());
            state.chapter_content_loading = true;
        }
        let result = self.inner.api.chapter_content(book_id, file).await;

        let mut state = self.inner.state.write().await;
        state.chapter_content_loading = false;
        match result {
            Ok(content) => {
                state.chapter_content = Some(content);
                Ok(())
            }
            Err(e) => {
                state.chapter_content = None;
                Err(e)
            }
        }
    }

    pub async fn load_languages(&self, book_id: &str) -> Result<BookLanguages> {
        let info = self.inner.api.languages(book_id).await?;
        self.inner
            .state
            .write()
            .await
            .languages
            .insert(book_id.to_string(), info.clone());
        Ok(info)
    }

    /// Close the open book. Its job controllers stop tracking; running
    /// jobs keep their last progress for a later attach.
    pub async fn clear_current_book(&self) {
        let book_id = {
            let mut state = self.inner.state.write().await;
            let id = state.current_book.take().map(|b| b.id);
            state.chapters.clear();
            state.current_chapter = None;
            state.chapter_content = None;
            id
        };
        let Some(book_id) = book_id else {
            return;
        };

        let jobs = self.inner.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for ((id, _), controller) in jobs.iter() {
            if *id == book_id {
                controller.detach();
            }
        }
    }

    /// The job controller for `book_id` and `kind`.
    ///
    /// Created on first use. Completion triggers one refresh of the data
    /// the job produced.
    pub fn job(&self, book_id: &str, kind: JobKind) -> JobController<ApiClient> {
        let mut jobs = self.inner.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (book_id.to_string(), kind);
        if let Some(controller) = jobs.get(&key) {
            return controller.clone();
        }

        let controller = JobController::new(
            self.inner.api.clone(),
            kind,
            book_id,
            self.inner.api.config().poll_interval(),
        );
        self.watch_completion(&controller);
        jobs.insert(key, controller.clone());
        controller
    }

    fn watch_completion(&self, controller: &JobController<ApiClient>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(book_id = %controller.book_id(), "No runtime, completion refresh disabled");
            return;
        };
        let mut events = controller.events();
        let store = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(JobEvent::Completed { kind, book_id, .. }) => {
                        let Some(inner) = Weak::upgrade(&store) else {
                            break;
                        };
                        BookStore { inner }.refresh_after(kind, &book_id).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Job event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    async fn refresh_after(&self, kind: JobKind, book_id: &str) {
        info!(%kind, book_id, "Refreshing after job completion");
        let result = match kind {
            JobKind::Extraction => match self.load_book(book_id).await {
                Ok(()) => self.load_chapters(book_id).await,
                Err(e) => Err(e),
            },
            JobKind::Translation => self.load_languages(book_id).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(%kind, book_id, error = %e, "Refresh after completion failed");
        }
    }
}
