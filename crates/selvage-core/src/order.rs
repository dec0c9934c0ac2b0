//! Order and line-item types — the records the sync writes and every
//! analytics pass reads.
//!
//! An order is identified by its source-system id and is mutated in place
//! only when the remote reports a strictly newer `updated_at`; it is never
//! deleted (financial record). Line items are owned by their order and carry
//! a title snapshot taken at order time, so later catalog renames do not
//! rewrite history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, catalog::Customer, money::Money};

// ─── Financial status ────────────────────────────────────────────────────────

/// Settlement state of an order as reported by the commerce platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
  Pending,
  Paid,
  Refunded,
  PartiallyRefunded,
  Voided,
}

impl FinancialStatus {
  /// The string stored in the `financial_status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Paid => "paid",
      Self::Refunded => "refunded",
      Self::PartiallyRefunded => "partially_refunded",
      Self::Voided => "voided",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "paid" => Ok(Self::Paid),
      "refunded" => Ok(Self::Refunded),
      "partially_refunded" => Ok(Self::PartiallyRefunded),
      "voided" => Ok(Self::Voided),
      other => Err(Error::UnknownFinancialStatus(other.to_owned())),
    }
  }
}

// ─── Attribution ─────────────────────────────────────────────────────────────

/// UTM campaign attribution. Absent parameters stay `None` — never an empty
/// string — so campaign aggregation does not conflate "missing" with "".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
  pub utm_source:   Option<String>,
  pub utm_medium:   Option<String>,
  pub utm_campaign: Option<String>,
  pub utm_content:  Option<String>,
  pub utm_term:     Option<String>,
}

// ─── Order ───────────────────────────────────────────────────────────────────

/// One order as held in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  /// Source-system order id; unique and immutable.
  pub order_id:         i64,
  pub created_at:       DateTime<Utc>,
  /// Drives the freshness check on re-sync: stored rows are overwritten only
  /// by a strictly newer `updated_at`.
  pub updated_at:       DateTime<Utc>,
  pub financial_status: FinancialStatus,
  pub total:            Money,
  pub currency:         String,
  pub customer_id:      Option<i64>,
  pub email:            Option<String>,
  pub country:          Option<String>,
  pub province:         Option<String>,
  pub city:             Option<String>,
  pub attribution:      Attribution,
}

impl Order {
  /// Customer grouping key: the source customer id, falling back to the
  /// lowercased order email for guest checkouts.
  pub fn customer_key(&self) -> Option<String> {
    match (self.customer_id, &self.email) {
      (Some(id), _) => Some(id.to_string()),
      (None, Some(email)) if !email.is_empty() => Some(email.to_lowercase()),
      _ => None,
    }
  }
}

// ─── LineItem ────────────────────────────────────────────────────────────────

/// One purchased product within an order. Identity is the composite
/// (order id, source line-item id); rows are cascade-deleted with the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
  pub order_id:     i64,
  pub line_item_id: i64,
  pub product_id:   i64,
  /// Title snapshot at order time.
  pub title:        String,
  pub unit_price:   Money,
  /// Always positive; zero-quantity items are rejected at the boundary.
  pub quantity:     u32,
}

impl LineItem {
  /// Computed line revenue.
  pub fn revenue(&self) -> Money { self.unit_price.times(self.quantity) }
}

// ─── OrderWithItems ──────────────────────────────────────────────────────────

/// Unit of ingestion: an order plus its line items (and the customer snapshot
/// carried on the payload), committed atomically together.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderWithItems {
  pub order:      Order,
  pub line_items: Vec<LineItem>,
  pub customer:   Option<Customer>,
}
