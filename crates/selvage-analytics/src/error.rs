//! Error type for `selvage-analytics`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The store does not hold enough data for a meaningful computation.
  /// Callers treat this as "no result available", not as a crash.
  #[error("insufficient data: {reason}")]
  InsufficientData { reason: String },
}

impl Error {
  pub fn insufficient(reason: impl Into<String>) -> Self {
    Self::InsufficientData { reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
