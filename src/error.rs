//! Error taxonomy for the offline core.

use crate::models::SyncActionType;

/// Failures raised by the persistent store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("sqlite: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to (de)serialize row: {0}")]
  Serde(#[from] serde_json::Error),

  #[error("store lock poisoned")]
  LockPoisoned,

  #[error("no row with key {key} in {table}")]
  NotFound { table: &'static str, key: i64 },

  #[error("row in {table} has no key")]
  MissingKey { table: &'static str },

  #[error("{index} is not an index of {table}")]
  UnknownIndex { table: &'static str, index: String },

  #[error("failed to prepare storage location: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors surfaced by the router, the queue and the remote API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Unreachable host or a server-side failure (status 0 or >= 500).
  #[error("remote unreachable (status {status}): {message}")]
  Connectivity { status: u16, message: String },

  /// A 4xx response the caller has to deal with.
  #[error("request rejected (status {status}): {message}")]
  Application { status: u16, message: String },

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("{method} {path} is not supported in offline mode")]
  Unsupported { method: String, path: String },

  #[error("{resource} is not available offline")]
  NotAvailableOffline { resource: String },

  #[error("replay of {action_type} action {id} failed: {source}")]
  SyncAction {
    id: i64,
    action_type: SyncActionType,
    #[source]
    source: Box<Error>,
  },

  #[error("remote call timed out after {0:?}")]
  Timeout(std::time::Duration),

  #[error("unexpected response body: {0}")]
  Decode(#[from] serde_json::Error),
}

impl Error {
  /// Whether this failure means the network could not be used, as opposed to
  /// the remote rejecting the request.
  pub fn is_connectivity(&self) -> bool {
    matches!(self, Error::Connectivity { .. } | Error::Timeout(_))
  }

  /// Whether the remote answered 404.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::Application { status: 404, .. })
  }

  /// Classify a failed HTTP exchange. `status` 0 means no response at all.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    let message = message.into();
    if status == 0 || status >= 500 {
      Error::Connectivity { status, message }
    } else {
      Error::Application { status, message }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
