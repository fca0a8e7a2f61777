//! Error types for holidir.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a run before (or instead of) any mailbox work.
#[derive(Error, Debug)]
pub enum HolidirError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider process failed: {0}")]
    ProviderProcess(String),

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("Provider request timed out after {0}")]
    ProviderTimeout(String),

    #[error("Discovery returned untrusted endpoint '{found}' (expected '{expected}')")]
    UntrustedEndpoint { found: String, expected: String },

    #[error("Holiday catalog error: {0}")]
    Catalog(String),

    #[error("Mailbox list not found: {0}")]
    MailboxListNotFound(PathBuf),

    #[error("Mailbox list unreadable: {path}: {source}")]
    MailboxListUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mailbox export failed: {0}")]
    MailboxExport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for holidir operations.
pub type HolidirResult<T> = Result<T, HolidirError>;

/// A failed call against the calendar service for one mailbox.
///
/// Never fatal to a run: the batch engine turns it into a log line and a
/// retry (or a fatal-for-mailbox record on the second attempt).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The service answered, and the answer was an error.
    #[error("{0}")]
    Rejected(String),

    /// The call never produced a usable answer.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {0}")]
    Timeout(String),
}

impl From<HolidirError> for ApiError {
    fn from(err: HolidirError) -> Self {
        match err {
            HolidirError::Provider(msg) => ApiError::Rejected(msg),
            HolidirError::ProviderTimeout(after) => ApiError::Timeout(after),
            other => ApiError::Transport(other.to_string()),
        }
    }
}
