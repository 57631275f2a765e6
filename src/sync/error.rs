use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// Why a sync pass did not complete. None of these advance the cursor.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Push failed: {0}")]
    PushFailed(#[source] RemoteError),

    #[error("Pull failed: {0}")]
    PullFailed(#[source] RemoteError),

    #[error("A sync pass is already running for this owner")]
    SyncInProgress,

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cursor store error: {0}")]
    Cursor(#[source] StoreError),
}

impl SyncError {
    /// Whether calling `synchronize` again later can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Unauthenticated => false,
            SyncError::PushFailed(e) | SyncError::PullFailed(e) => {
                !matches!(e, RemoteError::Unauthorized(_))
            }
            _ => true,
        }
    }
}
