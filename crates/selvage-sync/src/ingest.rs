//! Checkpointed incremental ingestion.
//!
//! Both ingestors share the same shape: take the single-writer lock, fetch
//! ascending pages with bounded backoff, commit each page atomically, then
//! durably advance the cursor to the page's max `updated_at` minus a safety
//! overlap. A failure releases the lock with the cursor still at the last
//! committed page; lock contention is a skip, not an error.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use selvage_core::{
  checkpoint::{CATALOG_SYNC, LockOutcome, ORDERS_SYNC, SyncLock},
  config::SyncTuning,
  store::OrderStore,
};

use crate::{
  Error, FetchError, Result,
  api::{CatalogApi, OrdersApi, Page, PageRequest},
  error::store_err,
  payload::{convert_order, convert_product},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of a sync attempt. `Skipped` is the lock-contention path and is
/// deliberately not an error.
#[derive(Debug)]
pub enum SyncOutcome<R> {
  Completed(R),
  Skipped { started_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrdersReport {
  pub pages_fetched:       u32,
  pub orders_upserted:     u64,
  pub line_items_upserted: u64,
  pub orders_stale:        u64,
  pub records_skipped:     u64,
  pub customers_refreshed: u64,
  pub cursor:              Option<DateTime<Utc>>,
  pub lock_reclaimed:      bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogReport {
  pub pages_fetched:     u32,
  pub products_upserted: u64,
  pub records_skipped:   u64,
  pub cursor:            Option<DateTime<Utc>>,
  pub lock_reclaimed:    bool,
}

// ─── Retry ───────────────────────────────────────────────────────────────────

/// Run `op` with exponential backoff on transient failures. A non-transient
/// failure or an exhausted budget becomes [`Error::FetchExhausted`].
async fn with_retry<T, F, Fut>(tuning: &SyncTuning, mut op: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, FetchError>>,
{
  let mut attempts = 0u32;
  loop {
    attempts += 1;
    match op().await {
      Ok(value) => return Ok(value),
      Err(FetchError::Transient { message, retry_after })
        if attempts <= tuning.max_retries =>
      {
        let shift = (attempts - 1).min(10);
        let delay = retry_after
          .unwrap_or_else(|| tuning.retry_base().saturating_mul(1u32 << shift));
        warn!(
          attempt = attempts,
          delay_ms = delay.as_millis() as u64,
          %message,
          "transient fetch failure, backing off"
        );
        tokio::time::sleep(delay).await;
      }
      Err(source) => return Err(Error::FetchExhausted { attempts, source }),
    }
  }
}

/// Cursor candidate for a committed page: its max `updated_at` minus the
/// overlap, never moving the cursor backwards.
fn advanced_cursor(
  current: Option<DateTime<Utc>>,
  page_max: DateTime<Utc>,
  tuning: &SyncTuning,
) -> DateTime<Utc> {
  let candidate = page_max - tuning.overlap();
  match current {
    Some(current) => current.max(candidate),
    None => candidate,
  }
}

// ─── Order ingestor ──────────────────────────────────────────────────────────

/// Incremental order sync: remote API to store, under the
/// `orders-incremental` checkpoint.
pub struct OrderIngestor<A, S> {
  api:    A,
  store:  S,
  tuning: SyncTuning,
}

impl<A: OrdersApi, S: OrderStore> OrderIngestor<A, S> {
  pub fn new(api: A, store: S, tuning: SyncTuning) -> Self {
    Self { api, store, tuning }
  }

  pub async fn sync(&self) -> Result<SyncOutcome<OrdersReport>> {
    let lock = match self
      .store
      .acquire_lock(ORDERS_SYNC, self.tuning.staleness())
      .await
      .map_err(store_err)?
    {
      LockOutcome::Acquired(lock) => lock,
      LockOutcome::Busy { started_at } => {
        info!(sync_type = ORDERS_SYNC, %started_at, "sync already running, skipping");
        return Ok(SyncOutcome::Skipped { started_at });
      }
    };
    if lock.reclaimed {
      warn!(sync_type = ORDERS_SYNC, "reclaimed a stale in-progress lock");
    }

    match self.run(&lock).await {
      Ok(mut report) => {
        report.customers_refreshed =
          self.store.refresh_customer_totals().await.map_err(store_err)?;
        self.store.commit_lock(&lock).await.map_err(store_err)?;
        report.lock_reclaimed = lock.reclaimed;
        info!(
          pages = report.pages_fetched,
          upserted = report.orders_upserted,
          stale = report.orders_stale,
          skipped = report.records_skipped,
          "order sync complete"
        );
        Ok(SyncOutcome::Completed(report))
      }
      Err(err) => {
        if let Err(release_err) =
          self.store.release_failed(&lock, &err.to_string()).await
        {
          warn!(%release_err, "could not record sync failure on checkpoint");
        }
        Err(err)
      }
    }
  }

  async fn run(&self, lock: &SyncLock) -> Result<OrdersReport> {
    let mut report = OrdersReport { cursor: lock.cursor, ..Default::default() };
    let mut next: Option<String> = None;

    loop {
      let request = PageRequest {
        updated_since: lock.cursor,
        page_size:     self.tuning.page_size,
        next:          next.take(),
      };
      let page: Page<_> =
        with_retry(&self.tuning, || self.api.fetch_orders(request.clone())).await?;
      let fetched = page.items.len();
      if fetched == 0 {
        break;
      }
      report.pages_fetched += 1;

      let mut converted = Vec::with_capacity(fetched);
      let mut page_max: Option<DateTime<Utc>> = None;
      for raw in page.items {
        match convert_order(raw) {
          Ok(order) => {
            page_max = Some(match page_max {
              Some(max) => max.max(order.order.updated_at),
              None => order.order.updated_at,
            });
            converted.push(order);
          }
          Err(err) => {
            warn!(order_id = err.id, error = %err, "skipping malformed order record");
            report.records_skipped += 1;
          }
        }
      }

      let upsert = self
        .store
        .upsert_order_page(converted)
        .await
        .map_err(store_err)?;
      report.orders_upserted += upsert.orders_upserted;
      report.line_items_upserted += upsert.line_items_upserted;
      report.orders_stale += upsert.orders_stale;

      if let Some(page_max) = page_max {
        let cursor = advanced_cursor(report.cursor, page_max, &self.tuning);
        self
          .store
          .advance_cursor(lock, cursor)
          .await
          .map_err(store_err)?;
        report.cursor = Some(cursor);
      }

      // A short page means the remote stream is drained.
      if fetched < self.tuning.page_size as usize {
        break;
      }
      match page.next {
        Some(url) => next = Some(url),
        None => break,
      }
    }

    Ok(report)
  }
}

// ─── Catalog ingestor ────────────────────────────────────────────────────────

/// Product catalog sync under the `catalog-incremental` checkpoint. Same
/// lock and paging discipline as the order sync; products have no staleness
/// rule, the latest fetched row simply wins.
pub struct CatalogIngestor<A, S> {
  api:    A,
  store:  S,
  tuning: SyncTuning,
}

impl<A: CatalogApi, S: OrderStore> CatalogIngestor<A, S> {
  pub fn new(api: A, store: S, tuning: SyncTuning) -> Self {
    Self { api, store, tuning }
  }

  pub async fn sync(&self) -> Result<SyncOutcome<CatalogReport>> {
    let lock = match self
      .store
      .acquire_lock(CATALOG_SYNC, self.tuning.staleness())
      .await
      .map_err(store_err)?
    {
      LockOutcome::Acquired(lock) => lock,
      LockOutcome::Busy { started_at } => {
        info!(sync_type = CATALOG_SYNC, %started_at, "sync already running, skipping");
        return Ok(SyncOutcome::Skipped { started_at });
      }
    };
    if lock.reclaimed {
      warn!(sync_type = CATALOG_SYNC, "reclaimed a stale in-progress lock");
    }

    match self.run(&lock).await {
      Ok(mut report) => {
        self.store.commit_lock(&lock).await.map_err(store_err)?;
        report.lock_reclaimed = lock.reclaimed;
        info!(
          pages = report.pages_fetched,
          upserted = report.products_upserted,
          "catalog sync complete"
        );
        Ok(SyncOutcome::Completed(report))
      }
      Err(err) => {
        if let Err(release_err) =
          self.store.release_failed(&lock, &err.to_string()).await
        {
          warn!(%release_err, "could not record sync failure on checkpoint");
        }
        Err(err)
      }
    }
  }

  async fn run(&self, lock: &SyncLock) -> Result<CatalogReport> {
    let mut report = CatalogReport { cursor: lock.cursor, ..Default::default() };
    let mut next: Option<String> = None;

    loop {
      let request = PageRequest {
        updated_since: lock.cursor,
        page_size:     self.tuning.page_size,
        next:          next.take(),
      };
      let page: Page<_> =
        with_retry(&self.tuning, || self.api.fetch_products(request.clone())).await?;
      let fetched = page.items.len();
      if fetched == 0 {
        break;
      }
      report.pages_fetched += 1;

      let mut converted = Vec::with_capacity(fetched);
      let mut page_max: Option<DateTime<Utc>> = None;
      for raw in page.items {
        match convert_product(raw) {
          Ok(product) => {
            if let Some(updated_at) = product.updated_at {
              page_max = Some(page_max.map_or(updated_at, |max| max.max(updated_at)));
            }
            converted.push(product);
          }
          Err(err) => {
            warn!(product_id = err.id, error = %err, "skipping malformed product record");
            report.records_skipped += 1;
          }
        }
      }

      report.products_upserted += self
        .store
        .upsert_products(converted)
        .await
        .map_err(store_err)?;

      if let Some(page_max) = page_max {
        let cursor = advanced_cursor(report.cursor, page_max, &self.tuning);
        self
          .store
          .advance_cursor(lock, cursor)
          .await
          .map_err(store_err)?;
        report.cursor = Some(cursor);
      }

      if fetched < self.tuning.page_size as usize {
        break;
      }
      match page.next {
        Some(url) => next = Some(url),
        None => break,
      }
    }

    Ok(report)
  }
}
