//! The payload validation boundary.
//!
//! Raw API records are loosely typed: almost every field is optional, money
//! arrives as decimal strings, and attribution hides in the landing-site
//! query string. Everything is converted to the typed domain model here;
//! a record that fails conversion is skipped by the ingestor with a WARN,
//! never ingested partially.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use selvage_core::{
  catalog::{Customer, Product},
  money::Money,
  order::{Attribution, FinancialStatus, LineItem, Order, OrderWithItems},
};

/// A single record failed validation. Carries the source id so the skip log
/// is actionable.
#[derive(Debug, Error)]
#[error("record {id}: {reason}")]
pub struct PayloadError {
  pub id:     i64,
  pub reason: String,
}

// ─── Raw wire shapes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrder {
  pub id:               i64,
  pub created_at:       Option<String>,
  pub updated_at:       Option<String>,
  pub financial_status: Option<String>,
  pub total_price:      Option<String>,
  pub currency:         Option<String>,
  pub email:            Option<String>,
  pub landing_site:     Option<String>,
  pub billing_address:  Option<RawAddress>,
  pub shipping_address: Option<RawAddress>,
  pub customer:         Option<RawCustomer>,
  #[serde(default)]
  pub line_items:       Vec<RawLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLineItem {
  pub id:         i64,
  pub product_id: Option<i64>,
  pub title:      Option<String>,
  pub price:      Option<String>,
  pub quantity:   Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAddress {
  pub country:  Option<String>,
  pub province: Option<String>,
  pub city:     Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCustomer {
  pub id:                Option<i64>,
  pub email:             Option<String>,
  pub country:           Option<String>,
  #[serde(default)]
  pub accepts_marketing: bool,
  pub total_spent:       Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProduct {
  pub id:           i64,
  pub title:        Option<String>,
  pub handle:       Option<String>,
  pub created_at:   Option<String>,
  pub published_at: Option<String>,
  pub updated_at:   Option<String>,
  /// Comma-separated on the wire.
  pub tags:         Option<String>,
}

// ─── Conversion ──────────────────────────────────────────────────────────────

fn parse_dt(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

fn require_dt(id: i64, field: &str, raw: Option<&str>) -> Result<DateTime<Utc>, PayloadError> {
  raw
    .and_then(parse_dt)
    .ok_or_else(|| PayloadError {
      id,
      reason: format!("missing or unparseable {field}"),
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

/// Extract UTM parameters from a landing-site URL. The value may be a bare
/// path, so a placeholder base is used for relative parses. Anything that
/// does not parse yields an empty attribution rather than an error.
pub fn attribution_from_landing_site(landing: Option<&str>) -> Attribution {
  let Some(raw) = landing.filter(|s| !s.trim().is_empty()) else {
    return Attribution::default();
  };

  let url = Url::parse(raw).or_else(|_| {
    Url::parse("https://placeholder.invalid").and_then(|base| base.join(raw))
  });
  let Ok(url) = url else {
    return Attribution::default();
  };

  let mut attribution = Attribution::default();
  for (key, value) in url.query_pairs() {
    let value = value.trim();
    if value.is_empty() {
      continue;
    }
    let slot = match key.as_ref() {
      "utm_source" => &mut attribution.utm_source,
      "utm_medium" => &mut attribution.utm_medium,
      "utm_campaign" => &mut attribution.utm_campaign,
      "utm_content" => &mut attribution.utm_content,
      "utm_term" => &mut attribution.utm_term,
      _ => continue,
    };
    slot.get_or_insert_with(|| value.to_owned());
  }
  attribution
}

/// Validate one raw order into the typed ingestion unit.
///
/// Line items without a product reference or a positive quantity are dropped
/// silently; they carry no analytical signal. The order itself fails only on
/// unusable identity, timestamps, status or total.
pub fn convert_order(raw: RawOrder) -> Result<OrderWithItems, PayloadError> {
  let id = raw.id;

  let created_at = require_dt(id, "created_at", raw.created_at.as_deref())?;
  let updated_at = require_dt(id, "updated_at", raw.updated_at.as_deref())?;

  let status_raw = raw.financial_status.as_deref().unwrap_or("");
  let financial_status = FinancialStatus::parse(status_raw).map_err(|_| PayloadError {
    id,
    reason: format!("unknown financial status {status_raw:?}"),
  })?;

  let total = Money::parse_decimal(raw.total_price.as_deref().unwrap_or("0"))
    .map_err(|e| PayloadError { id, reason: format!("bad total_price: {e}") })?;

  let address = raw.billing_address.or(raw.shipping_address);
  let (country, province, city) = address
    .map(|a| (non_empty(a.country), non_empty(a.province), non_empty(a.city)))
    .unwrap_or_default();

  let customer = raw.customer.map(convert_customer).transpose().map_err(
    |reason| PayloadError { id, reason },
  )?;

  let line_items = raw
    .line_items
    .into_iter()
    .filter_map(|item| convert_line_item(id, item))
    .collect();

  Ok(OrderWithItems {
    order: Order {
      order_id: id,
      created_at,
      updated_at,
      financial_status,
      total,
      currency: non_empty(raw.currency).unwrap_or_else(|| "USD".to_owned()),
      customer_id: customer.as_ref().and_then(|c: &Customer| c.customer_id),
      email: non_empty(raw.email),
      country,
      province,
      city,
      attribution: attribution_from_landing_site(raw.landing_site.as_deref()),
    },
    line_items,
    customer,
  })
}

fn convert_line_item(order_id: i64, raw: RawLineItem) -> Option<LineItem> {
  let product_id = raw.product_id?;
  let quantity = u32::try_from(raw.quantity?).ok().filter(|q| *q > 0)?;
  let unit_price = Money::parse_decimal(raw.price.as_deref().unwrap_or("0")).ok()?;
  Some(LineItem {
    order_id,
    line_item_id: raw.id,
    product_id,
    title: raw.title.unwrap_or_default(),
    unit_price,
    quantity,
  })
}

fn convert_customer(raw: RawCustomer) -> Result<Customer, String> {
  let total_spent = raw
    .total_spent
    .as_deref()
    .map(Money::parse_decimal)
    .transpose()
    .map_err(|e| format!("bad customer total_spent: {e}"))?;
  Ok(Customer {
    customer_id: raw.id,
    email: non_empty(raw.email),
    country: non_empty(raw.country),
    accepts_marketing: raw.accepts_marketing,
    total_spent,
  })
}

/// Validate one raw catalog product. Unparseable timestamps degrade to
/// `None`; only a missing title is fatal for a catalog row.
pub fn convert_product(raw: RawProduct) -> Result<Product, PayloadError> {
  let title = non_empty(raw.title).ok_or_else(|| PayloadError {
    id:     raw.id,
    reason: "missing title".to_owned(),
  })?;

  let tags = raw
    .tags
    .as_deref()
    .unwrap_or("")
    .split(',')
    .map(|t| t.trim().to_owned())
    .filter(|t| !t.is_empty())
    .collect();

  Ok(Product {
    product_id: raw.id,
    title,
    handle: non_empty(raw.handle),
    created_at: raw.created_at.as_deref().and_then(parse_dt),
    published_at: raw.published_at.as_deref().and_then(parse_dt),
    updated_at: raw.updated_at.as_deref().and_then(parse_dt),
    tags,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw_order(json: serde_json::Value) -> RawOrder {
    serde_json::from_value(json).unwrap()
  }

  #[test]
  fn utm_parameters_come_from_the_landing_site_query() {
    let attribution = attribution_from_landing_site(Some(
      "/collections/all?utm_source=pinterest&utm_medium=social&utm_campaign=spring&ref=x",
    ));
    assert_eq!(attribution.utm_source.as_deref(), Some("pinterest"));
    assert_eq!(attribution.utm_medium.as_deref(), Some("social"));
    assert_eq!(attribution.utm_campaign.as_deref(), Some("spring"));
    assert_eq!(attribution.utm_content, None);
    assert_eq!(attribution.utm_term, None);
  }

  #[test]
  fn empty_utm_values_stay_absent() {
    let attribution = attribution_from_landing_site(Some(
      "https://shop.example.com/?utm_source=&utm_campaign=fall",
    ));
    assert_eq!(attribution.utm_source, None);
    assert_eq!(attribution.utm_campaign.as_deref(), Some("fall"));
    assert_eq!(attribution_from_landing_site(None), Attribution::default());
    assert_eq!(
      attribution_from_landing_site(Some("::not a url::")),
      Attribution::default()
    );
  }

  #[test]
  fn order_converts_with_items_and_customer() {
    let raw = raw_order(serde_json::json!({
      "id": 9001,
      "created_at": "2024-04-01T10:00:00Z",
      "updated_at": "2024-04-01T10:05:00Z",
      "financial_status": "paid",
      "total_price": "43.50",
      "currency": "USD",
      "email": "  Kay@Example.com ",
      "landing_site": "/?utm_source=newsletter",
      "billing_address": { "country": "US", "province": "OR", "city": "Portland" },
      "customer": { "id": 7, "email": "kay@example.com", "accepts_marketing": true },
      "line_items": [
        { "id": 1, "product_id": 100, "title": "Raglan Pattern", "price": "21.75", "quantity": 2 },
        { "id": 2, "product_id": null, "title": "custom note", "price": "0.00", "quantity": 1 },
        { "id": 3, "product_id": 200, "price": "5.00", "quantity": 0 }
      ]
    }));

    let converted = convert_order(raw).unwrap();
    assert_eq!(converted.order.order_id, 9001);
    assert_eq!(converted.order.total, Money::parse_decimal("43.50").unwrap());
    assert_eq!(converted.order.email.as_deref(), Some("Kay@Example.com"));
    assert_eq!(converted.order.customer_id, Some(7));
    assert_eq!(
      converted.order.attribution.utm_source.as_deref(),
      Some("newsletter")
    );
    // Item 2 has no product reference, item 3 no positive quantity.
    assert_eq!(converted.line_items.len(), 1);
    assert_eq!(converted.line_items[0].quantity, 2);
  }

  #[test]
  fn unknown_financial_status_fails_validation() {
    let raw = raw_order(serde_json::json!({
      "id": 9002,
      "created_at": "2024-04-01T10:00:00Z",
      "updated_at": "2024-04-01T10:00:00Z",
      "financial_status": "authorized",
      "total_price": "10.00"
    }));
    let err = convert_order(raw).unwrap_err();
    assert_eq!(err.id, 9002);
    assert!(err.reason.contains("authorized"));
  }

  #[test]
  fn missing_updated_at_fails_validation() {
    let raw = raw_order(serde_json::json!({
      "id": 9003,
      "created_at": "2024-04-01T10:00:00Z",
      "financial_status": "paid",
      "total_price": "10.00"
    }));
    assert!(convert_order(raw).is_err());
  }

  #[test]
  fn product_tags_split_on_commas() {
    let raw: RawProduct = serde_json::from_value(serde_json::json!({
      "id": 55,
      "title": "Linen Wrap Skirt",
      "handle": "linen-wrap-skirt",
      "tags": "skirts, linen,  summer ,",
      "published_at": "2023-06-01T00:00:00Z"
    }))
    .unwrap();
    let product = convert_product(raw).unwrap();
    assert_eq!(product.tags, vec!["skirts", "linen", "summer"]);
    assert!(product.published_at.is_some());
    assert!(product.created_at.is_none());
  }
}
