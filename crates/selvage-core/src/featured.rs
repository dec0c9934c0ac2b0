//! Featured-product history.
//!
//! Append-only log of which products were promoted and when. The selector
//! consults it to hard-exclude anything featured within the cool-down
//! window; rows are never mutated.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One past promotion of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedEntry {
  pub product_id:     i64,
  pub featured_on:    NaiveDate,
  pub campaign_theme: Option<String>,
}
