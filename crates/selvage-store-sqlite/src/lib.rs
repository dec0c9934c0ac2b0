//! SQLite implementation of the Selvage order store.

pub mod encode;
pub mod error;
pub mod schema;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use store::SqliteStore;
