//! RFM customer segmentation.
//!
//! Recency, frequency and monetary are each scored 1-5 by rank-based
//! quintiles over the active customer population, so the buckets track the
//! business instead of fixed thresholds. Labels come from an externally
//! supplied rule table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use selvage_core::{config::SegmentTable, money::Money, store::PaidOrderHeader};

use crate::{Error, Result};

/// One customer's RFM profile and assigned segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRfm {
  pub customer_key: String,
  pub recency_days: i64,
  pub frequency:    u64,
  pub monetary:     Money,
  pub r_score:      u8,
  pub f_score:      u8,
  pub m_score:      u8,
  pub segment:      String,
}

/// Segment every customer with at least one paid order, as of `as_of`.
/// Output is sorted by customer key, so repeated runs over the same store
/// snapshot are byte-identical.
pub fn segments(
  headers: &[PaidOrderHeader],
  as_of: DateTime<Utc>,
  table: &SegmentTable,
) -> Result<Vec<CustomerRfm>> {
  if headers.is_empty() {
    return Err(Error::insufficient("no paid orders with a customer key"));
  }

  struct Axes {
    last_order: DateTime<Utc>,
    frequency:  u64,
    monetary:   Money,
  }

  let mut per_customer: HashMap<&str, Axes> = HashMap::new();
  for header in headers {
    per_customer
      .entry(&header.customer_key)
      .and_modify(|axes| {
        axes.last_order = axes.last_order.max(header.created_at);
        axes.frequency += 1;
        axes.monetary = axes.monetary + header.total;
      })
      .or_insert(Axes {
        last_order: header.created_at,
        frequency:  1,
        monetary:   header.total,
      });
  }

  let recency = quintiles(per_customer.iter().map(|(key, axes)| {
    (*key, (as_of - axes.last_order).num_days())
  }));
  let frequency = quintiles(
    per_customer.iter().map(|(key, axes)| (*key, axes.frequency)),
  );
  let monetary = quintiles(
    per_customer
      .iter()
      .map(|(key, axes)| (*key, axes.monetary.minor_units())),
  );

  let mut result: Vec<CustomerRfm> = per_customer
    .iter()
    .map(|(key, axes)| {
      // Low recency-in-days means a recent buyer, so the score inverts.
      let r_score = 6 - recency[key];
      let f_score = frequency[key];
      let m_score = monetary[key];
      CustomerRfm {
        customer_key: (*key).to_owned(),
        recency_days: (as_of - axes.last_order).num_days(),
        frequency: axes.frequency,
        monetary: axes.monetary,
        r_score,
        f_score,
        m_score,
        segment: table.label_for(r_score, f_score, m_score).to_owned(),
      }
    })
    .collect();

  result.sort_by(|a, b| a.customer_key.cmp(&b.customer_key));
  Ok(result)
}

/// Rank-based quintile score per key: sort ascending by value (key as the
/// tie-break for determinism), then map rank position to 1-5.
fn quintiles<'a, V>(values: impl Iterator<Item = (&'a str, V)>) -> HashMap<&'a str, u8>
where
  V: Ord + Copy,
{
  let mut ranked: Vec<(&str, V)> = values.collect();
  ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));

  let n = ranked.len();
  ranked
    .into_iter()
    .enumerate()
    .map(|(rank, (key, _))| (key, (rank * 5 / n) as u8 + 1))
    .collect()
}
