//! Crate-wide error kinds.

use std::io;

use thiserror::Error;

/// Failures surfaced by the storage layer and the entity service.
///
/// Index-sync failures after a committed store mutation are deliberately not
/// a variant here: they ride inside [`crate::search::sync::SyncOutcome`] on
/// an otherwise-successful result, so a durable write is never reported as
/// failed just because the search index lagged.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed required input. No store or index call was attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested entity does not exist.
    #[error("item {0} not found")]
    NotFound(i64),

    /// Underlying persistence failure, including dynamic queries that
    /// reference columns unknown to the store.
    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem failure while preparing the database location.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// The database was written by a newer schema than this build supports.
    #[error("unsupported schema version {found} (supported up to {supported})")]
    Schema { found: i64, supported: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
