//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use progress_core::model::StatementError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `IngestService`. Only the primary statement write can
/// fail an ingestion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why the progress index was not updated for a stored statement.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressWriteError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("progress write timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressQueryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `StatementService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatementQueryError {
    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: u32, max: u32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
