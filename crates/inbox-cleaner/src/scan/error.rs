//! Scan error types.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::provider::ProviderError;

/// Errors that end a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A provider call failed and was not (or could no longer be) retried.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Committing a page failed; that page was rolled back.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A scan for this owner is already in progress.
    #[error("scan already running for {0}")]
    AlreadyRunning(String),

    /// The scan task ended without producing a result.
    #[error("scan aborted: {0}")]
    Aborted(String),
}

impl ScanError {
    /// Whether the failure means no usable credentials exist.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ScanError::Provider(ProviderError::Unauthenticated(_)))
    }
}
