//! Composite product scoring and the greedy weekly-specials selector.
//!
//! Each candidate gets a weighted sum of five normalised 0-1 signals:
//! momentum, historical performance, margin, complementarity with the
//! already-selected set, and freshness. Complementarity makes selection
//! greedy and order-dependent: every remaining candidate is re-scored after
//! each pick. All tie-breaks fall back to ascending product id, so the
//! output is exactly reproducible for a given store snapshot.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use selvage_core::{
  config::{ScoringWeights, SelectorConfig},
  featured::FeaturedEntry,
  store::{ProductSales, ProductStats},
};

use crate::{Error, LiftIndex, Result};

// ─── Output ──────────────────────────────────────────────────────────────────

/// The normalised component signals behind one score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentBreakdown {
  pub momentum:        f64,
  pub historical:      f64,
  pub margin:          f64,
  pub complementarity: f64,
  pub freshness:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProduct {
  pub product_id: i64,
  pub title:      String,
  pub score:      f64,
  pub components: ComponentBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
  pub picks:     Vec<ScoredProduct>,
  /// True when eligible candidates ran out before `top_n`. The result is
  /// reported short, never padded.
  pub exhausted: bool,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Store aggregates the scorer runs on. `recent` and `prior` are sales over
/// two adjacent windows of equal length ending at the scoring date.
pub struct ScoreInputs<'a> {
  pub stats:    &'a [ProductStats],
  pub recent:   &'a [ProductSales],
  pub prior:    &'a [ProductSales],
  pub lifts:    &'a LiftIndex,
  pub featured: &'a [FeaturedEntry],
  pub today:    NaiveDate,
}

// ─── Selector ────────────────────────────────────────────────────────────────

struct Candidate {
  product_id: i64,
  title:      String,
  momentum:   f64,
  historical: f64,
  margin:     f64,
  freshness:  f64,
}

/// Rank up to `top_n` products for the next weekly-specials batch.
///
/// Blocklisted, free, explicitly excluded and recently featured products
/// are removed before scoring. The first pick carries a zero
/// complementarity component; afterwards a candidate stays eligible in a
/// round only while its best lift against the selected set reaches
/// `min_complementarity_lift`.
pub fn recommend(
  inputs: &ScoreInputs<'_>,
  weights: &ScoringWeights,
  selector: &SelectorConfig,
  exclude: &[i64],
  top_n: usize,
) -> Result<Recommendation> {
  if inputs.stats.is_empty() {
    return Err(Error::insufficient("no products with paid sales"));
  }

  let mut excluded: HashSet<i64> = exclude.iter().copied().collect();
  excluded.extend(&selector.blocklist);
  excluded.extend(&selector.free_products);

  let last_featured = latest_feature_dates(inputs.featured);

  let recent_units = units_by_product(inputs.recent);
  let prior_units = units_by_product(inputs.prior);

  let max_lifetime = inputs
    .stats
    .iter()
    .map(|s| s.lifetime_units)
    .max()
    .unwrap_or(0);
  let historical_denom = ((max_lifetime + 1) as f64).ln();

  let prices: Vec<f64> = inputs
    .stats
    .iter()
    .map(|s| s.unit_price.to_major_lossy())
    .collect();
  let price_min = prices.iter().copied().fold(f64::INFINITY, f64::min);
  let price_max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let price_range = price_max - price_min;

  let mut candidates: Vec<Candidate> = Vec::new();
  for stats in inputs.stats {
    if excluded.contains(&stats.product_id) {
      continue;
    }
    let freshness = match freshness_signal(
      last_featured.get(&stats.product_id).copied(),
      inputs.today,
      selector,
    ) {
      Some(f) => f,
      // Inside the cool-down window: hard exclusion, not a penalty.
      None => {
        debug!(product_id = stats.product_id, "excluded by feature cool-down");
        continue;
      }
    };

    let recent = recent_units.get(&stats.product_id).copied().unwrap_or(0);
    let prior = prior_units.get(&stats.product_id).copied().unwrap_or(0);

    candidates.push(Candidate {
      product_id: stats.product_id,
      title: stats.title.clone(),
      momentum: momentum_signal(recent, prior),
      historical: if historical_denom > 0.0 {
        ((stats.lifetime_units + 1) as f64).ln() / historical_denom
      } else {
        0.0
      },
      margin: margin_signal(
        stats.unit_price.to_major_lossy(),
        selector.cost_estimate,
        price_range,
      ),
      freshness,
    });
  }

  let mut picks: Vec<ScoredProduct> = Vec::new();
  let mut selected_ids: Vec<i64> = Vec::new();

  while picks.len() < top_n && !candidates.is_empty() {
    let mut best: Option<(usize, f64, ComponentBreakdown)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
      let complementarity = if selected_ids.is_empty() {
        0.0
      } else {
        let max_lift =
          inputs.lifts.max_lift_against(candidate.product_id, &selected_ids);
        if max_lift < selector.min_complementarity_lift {
          continue;
        }
        max_lift / (1.0 + max_lift)
      };

      let components = ComponentBreakdown {
        momentum: candidate.momentum,
        historical: candidate.historical,
        margin: candidate.margin,
        complementarity,
        freshness: candidate.freshness,
      };
      let score = weights.momentum * components.momentum
        + weights.historical * components.historical
        + weights.margin * components.margin
        + weights.complementarity * components.complementarity
        + weights.freshness * components.freshness;

      let better = match &best {
        None => true,
        Some((best_index, best_score, _)) => {
          match score.total_cmp(best_score) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => {
              candidate.product_id < candidates[*best_index].product_id
            }
            std::cmp::Ordering::Less => false,
          }
        }
      };
      if better {
        best = Some((index, score, components));
      }
    }

    // No candidate cleared the complementarity threshold this round.
    let Some((index, score, components)) = best else {
      break;
    };

    let candidate = candidates.swap_remove(index);
    selected_ids.push(candidate.product_id);
    picks.push(ScoredProduct {
      product_id: candidate.product_id,
      title: candidate.title,
      score,
      components,
    });
  }

  let exhausted = picks.len() < top_n;
  Ok(Recommendation { picks, exhausted })
}

// ─── Signals ─────────────────────────────────────────────────────────────────

/// Share of combined-window sales that fall in the recent window; 0.5 means
/// flat, above it growth. Defined as 0.5 when both windows are empty.
fn momentum_signal(recent: u64, prior: u64) -> f64 {
  let total = recent + prior;
  if total == 0 {
    0.5
  } else {
    recent as f64 / total as f64
  }
}

/// Margin over the configured cost estimate, normalised against the
/// catalog's price range and clamped to 0-1. A degenerate range (a single
/// price point) treats every product as full-margin.
fn margin_signal(price: f64, cost_estimate: f64, price_range: f64) -> f64 {
  if price_range <= 0.0 {
    return 1.0;
  }
  ((price - cost_estimate) / price_range).clamp(0.0, 1.0)
}

/// `None` inside the cool-down window (hard exclusion); otherwise a 0-1 ramp
/// from the cool-down boundary back to full freshness over the horizon.
/// Never-featured products are fully fresh.
fn freshness_signal(
  last_featured: Option<NaiveDate>,
  today: NaiveDate,
  selector: &SelectorConfig,
) -> Option<f64> {
  let Some(last) = last_featured else {
    return Some(1.0);
  };
  let days_since = (today - last).num_days();
  if days_since < selector.cooldown_days {
    return None;
  }
  let horizon = selector.freshness_horizon_days.max(1) as f64;
  Some(((days_since - selector.cooldown_days) as f64 / horizon).min(1.0))
}

fn units_by_product(sales: &[ProductSales]) -> HashMap<i64, u64> {
  sales.iter().map(|s| (s.product_id, s.units)).collect()
}

fn latest_feature_dates(featured: &[FeaturedEntry]) -> HashMap<i64, NaiveDate> {
  let mut latest: HashMap<i64, NaiveDate> = HashMap::new();
  for entry in featured {
    latest
      .entry(entry.product_id)
      .and_modify(|d| *d = (*d).max(entry.featured_on))
      .or_insert(entry.featured_on);
  }
  latest
}
