pub mod dto;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{OwnerId, Task};
use crate::session::AuthToken;

pub use http::{HttpRemoteEndpoint, RemoteConfig};
pub use memory::InMemoryRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// True when the request never got an answer from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::Timeout)
    }
}

/// The server half of synchronization.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Every record of `owner`, tombstones included, changed after `since`.
    async fn pull(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError>;

    async fn push(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        changes: &[Task],
    ) -> Result<(), RemoteError>;

    /// The server's most recent change time for `owner`.
    async fn latest_time(
        &self,
        owner: OwnerId,
        token: &AuthToken,
    ) -> Result<DateTime<Utc>, RemoteError>;
}
