use async_trait::async_trait;
use thiserror::Error;
use trackwatch_core::{AccessMode, TrackSnapshot};

mod http;
mod wire;

pub use http::HttpClient;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transient transport or server failure; retried with backoff.
    #[error("network failure: {0}")]
    Network(String),
    /// The tracked identity's data is access-restricted on this path.
    #[error("visibility restricted by upstream")]
    VisibilityRestricted,
    /// Response arrived but could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

/// Read access to the remote "recent tracks" provider. Every operation is
/// idempotent and individually retryable; the caller picks the access path.
#[async_trait]
pub trait RecentTracksApi: Send + Sync {
    /// The newest entry for the tracked user, or None when the account has
    /// no recent tracks at all.
    async fn latest_snapshot(
        &self,
        mode: AccessMode,
    ) -> Result<Option<TrackSnapshot>, UpstreamError>;

    /// Recent listening history, most recent first. Includes the
    /// now-playing entry when one exists.
    async fn recent_history(
        &self,
        mode: AccessMode,
        limit: u32,
    ) -> Result<Vec<TrackSnapshot>, UpstreamError>;

    /// Catalog duration for a track, when the provider knows one.
    async fn track_duration(
        &self,
        mode: AccessMode,
        artist_name: &str,
        track_name: &str,
    ) -> Result<Option<u64>, UpstreamError>;
}
