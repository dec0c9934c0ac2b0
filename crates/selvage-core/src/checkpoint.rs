//! Sync checkpoints and the single-writer lock.
//!
//! The checkpoint row is the one piece of process-wide mutable state: a
//! persisted record with an owner token and an acquire/commit/release
//! lifecycle, so correctness survives process restarts. At most one
//! `in_progress` row may exist per sync type at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Sync type for the incremental order ingest.
pub const ORDERS_SYNC: &str = "orders-incremental";
/// Sync type for the product catalog ingest.
pub const CATALOG_SYNC: &str = "catalog-incremental";

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
  Success,
  Failed,
  InProgress,
}

impl CheckpointStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Failed => "failed",
      Self::InProgress => "in_progress",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "success" => Ok(Self::Success),
      "failed" => Ok(Self::Failed),
      "in_progress" => Ok(Self::InProgress),
      other => Err(Error::UnknownCheckpointStatus(other.to_owned())),
    }
  }
}

// ─── Checkpoint ──────────────────────────────────────────────────────────────

/// Persisted state of one sync type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
  pub sync_type:  String,
  /// Position of the last durably committed page; `None` before the first
  /// successful page.
  pub cursor:     Option<DateTime<Utc>>,
  pub started_at: Option<DateTime<Utc>>,
  pub status:     CheckpointStatus,
  pub last_error: Option<String>,
}

// ─── Lock ────────────────────────────────────────────────────────────────────

/// Proof of lock ownership, returned by a successful acquire. Every cursor
/// advance and release is validated against the token, so a run whose lock
/// was reclaimed as stale cannot corrupt a newer run's checkpoint.
#[derive(Debug, Clone)]
pub struct SyncLock {
  pub sync_type: String,
  pub token:     Uuid,
  /// Cursor at acquisition time — the resume point for this run.
  pub cursor:    Option<DateTime<Utc>>,
  /// True when a prior run was `in_progress` past the staleness threshold
  /// and its lock was taken over. Callers must surface this to the operator.
  pub reclaimed: bool,
}

/// Result of a lock acquisition attempt.
#[derive(Debug)]
pub enum LockOutcome {
  Acquired(SyncLock),
  /// Another run holds the lock and is not yet stale.
  Busy { started_at: DateTime<Utc> },
}
