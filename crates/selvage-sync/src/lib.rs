//! Incremental sync from the remote commerce API into the order store.
//!
//! `api` holds the transport traits and the reqwest client, `payload` the
//! validation boundary from loose wire JSON to domain types, and `ingest`
//! the checkpointed ingestors themselves.

pub mod api;
pub mod error;
pub mod ingest;
pub mod payload;

#[cfg(test)]
mod tests;

pub use error::{Error, FetchError, Result};
pub use ingest::{
  CatalogIngestor, CatalogReport, OrderIngestor, OrdersReport, SyncOutcome,
};
