//! The `OrderStore` trait and its read-model row types.
//!
//! The trait is implemented by storage backends (e.g.
//! `selvage-store-sqlite`). The sync and analytics layers depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};

use crate::{
  catalog::Product,
  checkpoint::{LockOutcome, SyncCheckpoint, SyncLock},
  featured::FeaturedEntry,
  money::Money,
  order::OrderWithItems,
};

// ─── Write results ───────────────────────────────────────────────────────────

/// Outcome of committing one page of orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageUpsert {
  /// Orders inserted or overwritten.
  pub orders_upserted:     u64,
  pub line_items_upserted: u64,
  /// Orders skipped because the stored `updated_at` was not older — the
  /// no-op path that makes re-delivery idempotent.
  pub orders_stale:        u64,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Header of one paid order, grouped per customer by the RFM segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct PaidOrderHeader {
  pub customer_key: String,
  pub created_at:   DateTime<Utc>,
  pub total:        Money,
}

/// Distinct products of one paid order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basket {
  pub order_id:    i64,
  /// Sorted, deduplicated.
  pub product_ids: Vec<i64>,
}

/// All paid baskets plus the denominator the basket analyzer needs.
#[derive(Debug, Clone, Default)]
pub struct BasketData {
  /// Count of all paid orders in scope, single-item orders included.
  pub total_orders: u64,
  pub baskets:      Vec<Basket>,
}

/// Aggregated paid sales of one product within a window.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSales {
  pub product_id: i64,
  pub title:      String,
  pub units:      u64,
  pub revenue:    Money,
  pub orders:     u64,
}

/// Lifetime sales stats of one product, input to the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductStats {
  pub product_id:     i64,
  pub title:          String,
  pub lifetime_units: u64,
  /// Representative unit price: the maximum line-item price ever observed.
  pub unit_price:     Money,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the analytical order store.
///
/// Ingestion writes are page-atomic; checkpoint methods implement the
/// single-writer lock of the sync contract. Analytics reads are plain
/// queries and may run concurrently with a sync's committed pages.
pub trait OrderStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ingestion writes ──────────────────────────────────────────────────

  /// Commit one page of orders in a single transaction. Each order is
  /// upserted by source id together with its line items and customer
  /// snapshot; stored rows with an `updated_at` that is not older are left
  /// untouched.
  fn upsert_order_page(
    &self,
    page: Vec<OrderWithItems>,
  ) -> impl Future<Output = Result<PageUpsert, Self::Error>> + Send + '_;

  /// Upsert catalog products; returns the number written.
  fn upsert_products(
    &self,
    products: Vec<Product>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Recompute every customer's cached lifetime spend from paid orders.
  /// Returns the number of customer rows updated.
  fn refresh_customer_totals(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Checkpoints & lock ────────────────────────────────────────────────

  /// Read a checkpoint row without touching the lock.
  fn load_checkpoint<'a>(
    &'a self,
    sync_type: &'a str,
  ) -> impl Future<Output = Result<Option<SyncCheckpoint>, Self::Error>> + Send + 'a;

  /// Try to become the single writer for `sync_type`. An `in_progress` row
  /// younger than `staleness` yields [`LockOutcome::Busy`]; an older one is
  /// treated as crashed and reclaimed with `reclaimed = true`.
  fn acquire_lock<'a>(
    &'a self,
    sync_type: &'a str,
    staleness: Duration,
  ) -> impl Future<Output = Result<LockOutcome, Self::Error>> + Send + 'a;

  /// Durably advance the cursor after a page commit, keeping the run
  /// `in_progress`. Fails if the token no longer owns the row.
  fn advance_cursor<'a>(
    &'a self,
    lock: &'a SyncLock,
    cursor: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Mark the run successful and release the lock.
  fn commit_lock<'a>(
    &'a self,
    lock: &'a SyncLock,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Mark the run failed and release the lock. The cursor stays at the last
  /// committed page so the next run resumes from the last good point.
  fn release_failed<'a>(
    &'a self,
    lock: &'a SyncLock,
    error: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Featured history ──────────────────────────────────────────────────

  /// Append to the featured log. Existing rows are never touched.
  fn record_featured(
    &self,
    entries: Vec<FeaturedEntry>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn featured_history(
    &self,
  ) -> impl Future<Output = Result<Vec<FeaturedEntry>, Self::Error>> + Send + '_;

  // ── Analytics reads ───────────────────────────────────────────────────

  /// Paid order headers with a resolvable customer key.
  fn paid_order_headers(
    &self,
  ) -> impl Future<Output = Result<Vec<PaidOrderHeader>, Self::Error>> + Send + '_;

  /// Paid baskets (distinct product sets per order), optionally limited to
  /// orders created at or after `since`.
  fn paid_baskets(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<BasketData, Self::Error>> + Send + '_;

  /// Paid, revenue-bearing product sales with `start <= created_at < end`.
  fn product_sales_between(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ProductSales>, Self::Error>> + Send + '_;

  /// Lifetime paid sales stats per product.
  fn product_stats(
    &self,
  ) -> impl Future<Output = Result<Vec<ProductStats>, Self::Error>> + Send + '_;

  /// Distinct, lowercased purchaser emails for one product — the
  /// suppression-list export for new-release campaigns.
  fn buyers_of_product(
    &self,
    product_id: i64,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}
