//! Domain types, configuration structures and the `OrderStore` trait for
//! the Selvage sync and analytics engine.
//!
//! Every other crate in the workspace depends on this one; it carries no
//! database or HTTP dependencies itself, so backends and transports stay
//! swappable.

// Store implementations write `async fn` against the `impl Future` trait
// methods; the advisory lint about their `Send` bounds does not apply.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod featured;
pub mod money;
pub mod order;
pub mod store;

pub use error::{Error, Result};
