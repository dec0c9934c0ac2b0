//! Market-basket analysis: co-purchase associations between product pairs.
//!
//! Pairs are canonicalised with the smaller id first, so each unordered pair
//! appears once. All ratios use the full paid-order count as denominator,
//! single-product orders included.

use std::collections::HashMap;

use serde::Serialize;

use selvage_core::store::BasketData;

use crate::{Error, Result};

/// One co-purchase association. `product_a < product_b` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Association {
  pub product_a:         i64,
  pub product_b:         i64,
  /// Orders containing both products.
  pub support_count:     u64,
  pub support:           f64,
  pub confidence_a_to_b: f64,
  pub confidence_b_to_a: f64,
  pub lift:              f64,
}

/// Compute all associations with at least `min_support_count` co-occurring
/// orders, sorted by lift desc, support desc, then pair ids.
pub fn associations(data: &BasketData, min_support_count: u64) -> Result<Vec<Association>> {
  if data.total_orders == 0 {
    return Err(Error::insufficient("no paid orders in the store"));
  }

  let mut product_orders: HashMap<i64, u64> = HashMap::new();
  let mut pair_orders: HashMap<(i64, i64), u64> = HashMap::new();

  for basket in &data.baskets {
    // Basket product ids are sorted and deduplicated, so (i, j) with i < j
    // enumerates each unordered pair once, already canonical.
    for (i, &a) in basket.product_ids.iter().enumerate() {
      *product_orders.entry(a).or_default() += 1;
      for &b in &basket.product_ids[i + 1..] {
        *pair_orders.entry((a, b)).or_default() += 1;
      }
    }
  }

  let total = data.total_orders as f64;
  let mut result: Vec<Association> = pair_orders
    .into_iter()
    .filter(|(_, co)| *co >= min_support_count.max(1))
    .map(|((a, b), co)| {
      let orders_a = product_orders[&a] as f64;
      let orders_b = product_orders[&b] as f64;
      let co_f = co as f64;
      let confidence_a_to_b = co_f / orders_a;
      let confidence_b_to_a = co_f / orders_b;
      Association {
        product_a: a,
        product_b: b,
        support_count: co,
        support: co_f / total,
        confidence_a_to_b,
        confidence_b_to_a,
        lift: confidence_a_to_b / (orders_b / total),
      }
    })
    .collect();

  result.sort_by(|x, y| {
    y.lift
      .total_cmp(&x.lift)
      .then(y.support_count.cmp(&x.support_count))
      .then(x.product_a.cmp(&y.product_a))
      .then(x.product_b.cmp(&y.product_b))
  });

  Ok(result)
}

// ─── Lift index ──────────────────────────────────────────────────────────────

/// Pair-lift lookup used by the selector's complementarity signal.
#[derive(Debug, Clone, Default)]
pub struct LiftIndex {
  lifts: HashMap<(i64, i64), f64>,
}

impl LiftIndex {
  pub fn from_associations(associations: &[Association]) -> Self {
    let lifts = associations
      .iter()
      .map(|a| ((a.product_a, a.product_b), a.lift))
      .collect();
    Self { lifts }
  }

  pub fn lift(&self, a: i64, b: i64) -> Option<f64> {
    let key = if a <= b { (a, b) } else { (b, a) };
    self.lifts.get(&key).copied()
  }

  /// Maximum lift between `candidate` and any product of `selected`;
  /// 0.0 when no association exists.
  pub fn max_lift_against(&self, candidate: i64, selected: &[i64]) -> f64 {
    selected
      .iter()
      .filter_map(|&picked| self.lift(candidate, picked))
      .fold(0.0, f64::max)
  }
}

#[cfg(test)]
mod tests {
  use selvage_core::store::Basket;

  use super::*;

  fn basket(order_id: i64, product_ids: &[i64]) -> Basket {
    Basket { order_id, product_ids: product_ids.to_vec() }
  }

  /// Fixture with hand-computed figures: 10 paid orders, products A=1 and
  /// B=2 co-occur in 4 of them, A appears in 6 total, B only in the
  /// co-occurrences.
  fn two_product_fixture() -> BasketData {
    let mut baskets = Vec::new();
    for id in 0..4 {
      baskets.push(basket(id, &[1, 2]));
    }
    baskets.push(basket(4, &[1]));
    baskets.push(basket(5, &[1]));
    // Unrelated single-product orders pad the denominator to 10.
    for id in 6..10 {
      baskets.push(basket(id, &[3]));
    }
    BasketData { total_orders: 10, baskets }
  }

  #[test]
  fn hand_computed_support_confidence_and_lift() {
    let result = associations(&two_product_fixture(), 3).unwrap();
    // Only the (1, 2) pair reaches the support threshold; product 3 never
    // co-occurs with anything.
    let ab = result
      .iter()
      .find(|a| a.product_a == 1 && a.product_b == 2)
      .unwrap();

    assert_eq!(ab.support_count, 4);
    assert!((ab.support - 0.4).abs() < 1e-12);
    // A in 6 orders: confidence(A→B) = 4/6.
    assert!((ab.confidence_a_to_b - 4.0 / 6.0).abs() < 1e-12);
    // B in 4 orders: confidence(B→A) = 4/4 = 1.
    assert!((ab.confidence_b_to_a - 1.0).abs() < 1e-12);
    // lift = (4/6) / (4/10) = 5/3.
    assert!((ab.lift - 5.0 / 3.0).abs() < 1e-12);
  }

  #[test]
  fn pairs_below_min_support_are_dropped() {
    let data = BasketData {
      total_orders: 3,
      baskets:      vec![basket(1, &[1, 2]), basket(2, &[1, 2]), basket(3, &[1, 3])],
    };
    let result = associations(&data, 2).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!((result[0].product_a, result[0].product_b), (1, 2));
  }

  #[test]
  fn empty_store_is_insufficient_data() {
    let err = associations(&BasketData::default(), 1).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { .. }));
  }

  #[test]
  fn output_order_is_lift_then_support_then_ids() {
    // Pair (1,2) co-occurs twice out of 4; pair (3,4) once but with a
    // perfect lift.
    let data = BasketData {
      total_orders: 4,
      baskets:      vec![
        basket(1, &[1, 2]),
        basket(2, &[1, 2]),
        basket(3, &[1]),
        basket(4, &[3, 4]),
      ],
    };
    let result = associations(&data, 1).unwrap();
    assert_eq!(result.len(), 2);
    // lift(3,4) = (1/1) / (1/4) = 4 > lift(1,2) = (2/3) / (2/4) = 4/3.
    assert_eq!((result[0].product_a, result[0].product_b), (3, 4));
    assert_eq!((result[1].product_a, result[1].product_b), (1, 2));
  }

  #[test]
  fn lift_index_is_symmetric_and_maxes_over_selected() {
    let result = associations(&two_product_fixture(), 1).unwrap();
    let index = LiftIndex::from_associations(&result);

    assert_eq!(index.lift(1, 2), index.lift(2, 1));
    assert!(index.lift(1, 3).is_none());
    assert!((index.max_lift_against(2, &[1, 3]) - 5.0 / 3.0).abs() < 1e-12);
    assert_eq!(index.max_lift_against(3, &[1, 2]), 0.0);
  }
}
