//! Error types for `selvage-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid monetary amount: {0:?}")]
  InvalidAmount(String),

  #[error("unknown financial status: {0:?}")]
  UnknownFinancialStatus(String),

  #[error("unknown checkpoint status: {0:?}")]
  UnknownCheckpointStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
