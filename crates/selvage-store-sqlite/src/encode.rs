//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as ISO 8601,
//! tag sets as compact JSON arrays. Monetary columns hold integer minor
//! units directly.

use chrono::{DateTime, NaiveDate, Utc};
use selvage_core::{
  money::Money,
  order::{Attribution, FinancialStatus, LineItem, Order},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse()
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `orders` row.
pub struct RawOrderRow {
  pub order_id:         i64,
  pub created_at:       String,
  pub updated_at:       String,
  pub financial_status: String,
  pub total_minor:      i64,
  pub currency:         String,
  pub customer_id:      Option<i64>,
  pub email:            Option<String>,
  pub country:          Option<String>,
  pub province:         Option<String>,
  pub city:             Option<String>,
  pub utm_source:       Option<String>,
  pub utm_medium:       Option<String>,
  pub utm_campaign:     Option<String>,
  pub utm_content:      Option<String>,
  pub utm_term:         Option<String>,
}

impl RawOrderRow {
  pub fn into_order(self) -> Result<Order> {
    Ok(Order {
      order_id:         self.order_id,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
      financial_status: FinancialStatus::parse(&self.financial_status)
        .map_err(Error::Core)?,
      total:            Money::from_minor(self.total_minor),
      currency:         self.currency,
      customer_id:      self.customer_id,
      email:            self.email,
      country:          self.country,
      province:         self.province,
      city:             self.city,
      attribution:      Attribution {
        utm_source:   self.utm_source,
        utm_medium:   self.utm_medium,
        utm_campaign: self.utm_campaign,
        utm_content:  self.utm_content,
        utm_term:     self.utm_term,
      },
    })
  }
}

/// Raw values read directly from a `line_items` row.
pub struct RawLineItemRow {
  pub order_id:         i64,
  pub line_item_id:     i64,
  pub product_id:       i64,
  pub title:            String,
  pub unit_price_minor: i64,
  pub quantity:         i64,
}

impl RawLineItemRow {
  pub fn into_line_item(self) -> Result<LineItem> {
    let quantity = u32::try_from(self.quantity)
      .map_err(|_| Error::InvalidRow(format!("invalid quantity {}", self.quantity)))?;
    Ok(LineItem {
      order_id:     self.order_id,
      line_item_id: self.line_item_id,
      product_id:   self.product_id,
      title:        self.title,
      unit_price:   Money::from_minor(self.unit_price_minor),
      quantity,
    })
  }
}
