//! Error type for `selvage-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] selvage_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unreadable row: {0}")]
  InvalidRow(String),

  /// The stored cursor for a sync type is unreadable. Fatal: requires a
  /// manual checkpoint reset, never a silent reset to zero.
  #[error("checkpoint corruption for {sync_type:?}: unreadable cursor {raw:?}")]
  CheckpointCorruption { sync_type: String, raw: String },

  /// The lock token no longer owns the checkpoint row — a stale reclaim has
  /// taken over. The losing run must stop writing.
  #[error("sync lock for {0:?} is no longer held by this run")]
  LockLost(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
