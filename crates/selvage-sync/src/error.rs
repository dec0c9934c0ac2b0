//! Error types for `selvage-sync`.

use std::time::Duration;

use thiserror::Error;

/// A single fetch attempt's failure, classified for the retry policy.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Network failure, rate limiting or a server-side error. Eligible for
  /// backoff retry; `retry_after` carries the remote's own backoff signal
  /// when it sent one.
  #[error("transient fetch failure: {message}")]
  Transient {
    message:     String,
    retry_after: Option<Duration>,
  },

  /// A non-retryable HTTP status (auth failure, bad request, gone).
  #[error("remote returned status {status}: {body}")]
  Status { status: u16, body: String },

  /// The response body could not be decoded.
  #[error("undecodable response: {0}")]
  Decode(String),
}

#[derive(Debug, Error)]
pub enum Error {
  /// The fetch gave up, either because retries ran out or because the
  /// failure was not retryable to begin with.
  #[error("fetch failed after {attempts} attempt(s): {source}")]
  FetchExhausted {
    attempts: u32,
    #[source]
    source:   FetchError,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Wrap a backend store error. The ingestor is generic over the store, so
/// its error type is carried boxed.
pub fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
