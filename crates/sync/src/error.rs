// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::remote::RemoteError;

/// Error type for sync engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local cache failure, propagated unmodified.
    #[error(transparent)]
    Cache(#[from] rv_core::Error),

    #[error("not found in remote tracker: {0}")]
    NotFound(String),

    /// The document has never been linked to a remote issue.
    #[error("{0} is not synced: no remote issue recorded")]
    NotSynced(String),

    #[error("{operation} failed after {retries} retries: {source}")]
    RetriesExhausted {
        operation: String,
        retries: usize,
        source: RemoteError,
    },

    /// A remote failure that was not retried.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("verification failed for {key}: expected {expected}")]
    VerificationFailed { key: String, expected: String },
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_)
                | SyncError::Remote(RemoteError::NotFound(_))
                | SyncError::Cache(rv_core::Error::NotFound(_))
        )
    }
}

/// Result type for sync engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
