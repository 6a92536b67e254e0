//! Error taxonomy for the sync engine.
//!
//! The split that matters operationally is transient versus permanent:
//! [`SyncError::Transient`] is the only variant the retry policy in
//! [`crate::feed`] will retry. Everything else fails the page or the run
//! immediately.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Retryable: network failures, HTTP 429 and 5xx responses.
    #[error("transient feed error: {0}")]
    Transient(String),

    /// A single construct inside a page body could not be parsed. Callers
    /// degrade the construct to a placeholder; this never fails a page on
    /// its own.
    #[error("malformed {construct} construct: {detail}")]
    MalformedContent { construct: String, detail: String },

    /// The store is in a state the replacement protocol does not allow.
    #[error("consistency violation on page {page_id}: {detail}")]
    Consistency { page_id: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// A sync for this source is already in flight.
    #[error("a sync run for source '{0}' is already in progress")]
    RunInProgress(String),

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The run was asked to stop; honored at page boundaries.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the retry policy should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// Wrap any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        SyncError::Storage(err.into())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(Box::new(err))
    }
}
