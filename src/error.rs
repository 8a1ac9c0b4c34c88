//! Error types for the cache store, the remote source and the sync policy.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the local cache store.
///
/// These are never swallowed by the sync policy: the cache is the last
/// fallback, so a storage fault has to reach the caller.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Could not determine application data directory")]
  NoDataDir,

  /// The table prefix is not a plain SQL identifier.
  #[error("Invalid cache namespace: {0:?}")]
  InvalidNamespace(String),

  #[error("Failed to (de)serialize domains: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Cache connection lock poisoned")]
  LockPoisoned,
}

/// Errors produced while talking to the remote country/university APIs.
#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} responded with {status}")]
  Status {
    url: String,
    status: reqwest::StatusCode,
  },

  #[error("Malformed payload from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("Invalid remote URL: {0}")]
  InvalidUrl(#[from] url::ParseError),
}

/// Failure of the online half of a sync.
///
/// The sync policy logs these and falls back to the cache; they never reach
/// the consumer.
#[derive(Error, Debug)]
pub enum SyncError {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Remote sync timed out after {0:?}")]
  Timeout(Duration),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
