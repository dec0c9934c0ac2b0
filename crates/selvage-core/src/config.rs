//! Externally supplied configuration.
//!
//! Scoring weights, exclusion lists, the RFM label table, and sync tuning are
//! data, not code: all of them deserialise from the operator's config file
//! and are re-read on every invocation, so tuning never touches scoring
//! logic. Defaults reproduce the values the business has been running with.

use chrono::Duration;
use serde::{Deserialize, Serialize};

// ─── Scoring weights ─────────────────────────────────────────────────────────

/// Weight of each normalised component signal in the composite product score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
  pub momentum:        f64,
  pub historical:      f64,
  pub margin:          f64,
  pub complementarity: f64,
  pub freshness:       f64,
}

impl Default for ScoringWeights {
  fn default() -> Self {
    Self {
      momentum:        0.30,
      historical:      0.25,
      margin:          0.15,
      complementarity: 0.20,
      freshness:       0.10,
    }
  }
}

// ─── Selector configuration ──────────────────────────────────────────────────

/// Exclusion rules and selection tuning for the weekly-specials selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
  /// Products featured within this many days are hard-excluded.
  pub cooldown_days:           i64,
  /// Days past the cool-down over which the freshness signal ramps back to 1.
  pub freshness_horizon_days:  i64,
  /// Minimum raw lift against the already-selected set for a candidate to
  /// stay eligible after the first pick.
  pub min_complementarity_lift: f64,
  /// Length of the momentum windows (recent vs the equal prior period).
  pub momentum_window_days:    i64,
  /// Per-unit cost estimate, in major units, for the margin signal.
  pub cost_estimate:           f64,
  /// Minimum co-purchase count for an association to be considered.
  pub min_support_count:       u64,
  /// Products never eligible for selection.
  pub blocklist:               Vec<i64>,
  /// Designated free / non-revenue products.
  pub free_products:           Vec<i64>,
}

impl Default for SelectorConfig {
  fn default() -> Self {
    Self {
      cooldown_days:            90,
      freshness_horizon_days:   365,
      min_complementarity_lift: 1.0,
      momentum_window_days:     90,
      cost_estimate:            0.0,
      min_support_count:        3,
      blocklist:                Vec::new(),
      free_products:            Vec::new(),
    }
  }
}

// ─── RFM label table ─────────────────────────────────────────────────────────

/// One row of the RFM label table: inclusive score bounds per axis.
/// Omitted bounds default to the full 1–5 range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRule {
  pub label: String,
  #[serde(default = "score_min")]
  pub r_min: u8,
  #[serde(default = "score_max")]
  pub r_max: u8,
  #[serde(default = "score_min")]
  pub f_min: u8,
  #[serde(default = "score_max")]
  pub f_max: u8,
  #[serde(default = "score_min")]
  pub m_min: u8,
  #[serde(default = "score_max")]
  pub m_max: u8,
}

fn score_min() -> u8 { 1 }
fn score_max() -> u8 { 5 }

impl SegmentRule {
  fn matches(&self, r: u8, f: u8, m: u8) -> bool {
    (self.r_min..=self.r_max).contains(&r)
      && (self.f_min..=self.f_max).contains(&f)
      && (self.m_min..=self.m_max).contains(&m)
  }
}

/// Ordered, first-match-wins label table for RFM quintile triples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentTable {
  pub rules:         Vec<SegmentRule>,
  pub default_label: String,
}

impl SegmentTable {
  pub fn label_for(&self, r: u8, f: u8, m: u8) -> &str {
    self
      .rules
      .iter()
      .find(|rule| rule.matches(r, f, m))
      .map_or(self.default_label.as_str(), |rule| rule.label.as_str())
  }
}

impl Default for SegmentTable {
  fn default() -> Self {
    let rule = |label: &str, r: (u8, u8), f: (u8, u8), m: (u8, u8)| SegmentRule {
      label: label.to_owned(),
      r_min: r.0,
      r_max: r.1,
      f_min: f.0,
      f_max: f.1,
      m_min: m.0,
      m_max: m.1,
    };
    Self {
      rules:         vec![
        rule("Champions", (4, 5), (4, 5), (4, 5)),
        rule("Loyal Customers", (3, 5), (3, 5), (1, 5)),
        rule("New Customers", (4, 5), (1, 2), (1, 5)),
        rule("At Risk", (1, 2), (3, 5), (1, 5)),
        rule("Lost", (1, 2), (1, 2), (1, 5)),
        rule("Big Spenders", (1, 5), (1, 5), (4, 5)),
      ],
      default_label: "Promising".to_owned(),
    }
  }
}

// ─── Sync tuning ─────────────────────────────────────────────────────────────

/// Tuning for the incremental syncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
  /// Rows requested per page.
  pub page_size:         u32,
  /// Retries for a transient fetch failure before the run fails.
  pub max_retries:       u32,
  /// Base of the retry backoff ladder, in seconds.
  pub retry_base_secs:   u64,
  /// Cursor safety overlap: the checkpoint trails the newest seen
  /// `updated_at` by this much to tolerate clock skew and timestamp ties on
  /// page boundaries.
  pub overlap_secs:      i64,
  /// Age past which an `in_progress` lock is treated as crashed and
  /// reclaimed.
  pub staleness_minutes: i64,
}

impl SyncTuning {
  pub fn overlap(&self) -> Duration { Duration::seconds(self.overlap_secs) }

  pub fn staleness(&self) -> Duration { Duration::minutes(self.staleness_minutes) }

  pub fn retry_base(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.retry_base_secs)
  }
}

impl Default for SyncTuning {
  fn default() -> Self {
    Self {
      page_size:         250,
      max_retries:       5,
      retry_base_secs:   10,
      overlap_secs:      60,
      staleness_minutes: 60,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_table_matches_known_triples() {
    let table = SegmentTable::default();
    assert_eq!(table.label_for(5, 5, 5), "Champions");
    assert_eq!(table.label_for(3, 3, 1), "Loyal Customers");
    assert_eq!(table.label_for(5, 1, 2), "New Customers");
    assert_eq!(table.label_for(1, 4, 2), "At Risk");
    assert_eq!(table.label_for(1, 1, 1), "Lost");
    assert_eq!(table.label_for(3, 1, 5), "Big Spenders");
    assert_eq!(table.label_for(3, 2, 3), "Promising");
  }

  #[test]
  fn rule_order_wins_over_later_matches() {
    // (5,5,5) matches both Champions and Loyal Customers; first rule wins.
    let table = SegmentTable::default();
    assert_eq!(table.label_for(5, 5, 5), "Champions");
  }
}
