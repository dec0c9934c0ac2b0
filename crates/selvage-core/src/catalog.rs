//! Product catalog and customer records.
//!
//! Products are upserted by a separate catalog sync; line items keep their
//! own title snapshots, so the catalog is enrichment, not a dependency of
//! the analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A catalog product, keyed by its source product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub product_id:   i64,
  /// Current title; historical analytics use the line-item snapshot instead.
  pub title:        String,
  pub handle:       Option<String>,
  pub created_at:   Option<DateTime<Utc>>,
  pub published_at: Option<DateTime<Utc>>,
  pub updated_at:   Option<DateTime<Utc>>,
  pub tags:         Vec<String>,
}

/// A customer, keyed by source customer id or, for guest checkouts, by the
/// lowercased order email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub customer_id:       Option<i64>,
  pub email:             Option<String>,
  pub country:           Option<String>,
  pub accepts_marketing: bool,
  /// Cached lifetime spend. Derived and recomputable
  /// ([`refresh_customer_totals`](crate::store::OrderStore::refresh_customer_totals));
  /// never authoritative.
  pub total_spent:       Option<Money>,
}

impl Customer {
  /// Grouping key; `None` when the payload carried neither id nor email.
  pub fn key(&self) -> Option<String> {
    match (self.customer_id, &self.email) {
      (Some(id), _) => Some(id.to_string()),
      (None, Some(email)) if !email.is_empty() => Some(email.to_lowercase()),
      _ => None,
    }
  }
}
