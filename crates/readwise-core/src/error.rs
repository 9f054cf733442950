//! Error types for the readwise client.

use thiserror::Error;

/// Result type alias using readwise's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for readwise operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A request could not be issued, returned a non-2xx status on a job
    /// stream, or the connection failed while reading the body.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single event frame could not be decoded. Never surfaced from a
    /// stream; only logged.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server reported `status: error` for a job.
    #[error("Job error: {0}")]
    Job(String),

    /// The best-effort backend cancel call failed.
    #[error("Cancel error: {0}")]
    Cancel(String),

    /// A REST call returned a non-2xx status.
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// A job of this kind is already in flight for the book.
    #[error("{kind} job already running for book {book_id}")]
    JobAlreadyRunning { kind: String, book_id: String },

    /// The requested transition is not allowed from the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The source draft has edits that must be saved first.
    #[error("Unsaved changes: {0}")]
    UnsavedChanges(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::Api`] from a status code and an optional `detail`.
    pub fn api(status: u16, detail: Option<String>, fallback: &str) -> Self {
        Error::Api {
            status,
            detail: detail
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        }
    }

    /// True for errors caused by the connection rather than the server's answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
