//! Ingestor tests against a scripted in-memory API and a real in-memory
//! store.

use std::{
  collections::VecDeque,
  sync::Mutex,
  time::Duration as StdDuration,
};

use chrono::{DateTime, Utc};
use selvage_core::{
  checkpoint::{CATALOG_SYNC, CheckpointStatus, LockOutcome, ORDERS_SYNC},
  config::SyncTuning,
  store::OrderStore,
};
use selvage_store_sqlite::SqliteStore;

use crate::{
  Error, FetchError, SyncOutcome,
  api::{CatalogApi, OrdersApi, Page, PageRequest},
  ingest::{CatalogIngestor, OrderIngestor},
  payload::{RawOrder, RawProduct},
};

// ─── Scripted API ────────────────────────────────────────────────────────────

/// Replays a fixed script of page results, one per fetch call. An exhausted
/// script returns empty pages.
struct Scripted<T> {
  script: Mutex<VecDeque<Result<Page<T>, FetchError>>>,
}

impl<T> Scripted<T> {
  fn new(script: Vec<Result<Page<T>, FetchError>>) -> Self {
    Self { script: Mutex::new(script.into()) }
  }

  fn next_result(&self) -> Result<Page<T>, FetchError> {
    self
      .script
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Ok(Page { items: Vec::new(), next: None }))
  }
}

impl OrdersApi for Scripted<RawOrder> {
  async fn fetch_orders(&self, _req: PageRequest) -> Result<Page<RawOrder>, FetchError> {
    self.next_result()
  }
}

impl CatalogApi for Scripted<RawProduct> {
  async fn fetch_products(
    &self,
    _req: PageRequest,
  ) -> Result<Page<RawProduct>, FetchError> {
    self.next_result()
  }
}

fn transient() -> FetchError {
  FetchError::Transient {
    message:     "connection reset".into(),
    retry_after: Some(StdDuration::ZERO),
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn raw_order(id: i64, updated_at: &str, items: &[(i64, i64)]) -> RawOrder {
  let line_items: Vec<_> = items
    .iter()
    .map(|(line_id, product_id)| {
      serde_json::json!({
        "id": line_id,
        "product_id": product_id,
        "title": format!("Product {product_id}"),
        "price": "12.00",
        "quantity": 1
      })
    })
    .collect();
  serde_json::from_value(serde_json::json!({
    "id": id,
    "created_at": "2024-03-01T00:00:00Z",
    "updated_at": updated_at,
    "financial_status": "paid",
    "total_price": "12.00",
    "currency": "USD",
    "email": format!("buyer{id}@example.com"),
    "line_items": line_items
  }))
  .unwrap()
}

fn raw_product(id: i64, updated_at: &str) -> RawProduct {
  serde_json::from_value(serde_json::json!({
    "id": id,
    "title": format!("Pattern {id}"),
    "handle": format!("pattern-{id}"),
    "updated_at": updated_at,
    "tags": "patterns"
  }))
  .unwrap()
}

fn dt(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn tuning() -> SyncTuning {
  SyncTuning {
    page_size:       2,
    max_retries:     3,
    retry_base_secs: 0,
    overlap_secs:    60,
    ..Default::default()
  }
}

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

// ─── Order sync ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_ingests_all_pages_and_advances_the_cursor() {
  let s = store().await;
  let api = Scripted::new(vec![
    Ok(Page {
      items: vec![
        raw_order(1, "2024-03-01T10:00:00Z", &[(10, 100)]),
        raw_order(2, "2024-03-01T11:00:00Z", &[(20, 100), (21, 200)]),
      ],
      next:  Some("https://api.example.com/orders?page_info=p2".into()),
    }),
    // Short page: terminates the run.
    Ok(Page {
      items: vec![raw_order(3, "2024-03-01T12:00:00Z", &[(30, 200)])],
      next:  None,
    }),
  ]);

  let ingestor = OrderIngestor::new(api, s.clone(), tuning());
  let SyncOutcome::Completed(report) = ingestor.sync().await.unwrap() else {
    panic!("expected completed sync");
  };

  assert_eq!(report.pages_fetched, 2);
  assert_eq!(report.orders_upserted, 3);
  assert_eq!(report.line_items_upserted, 4);
  assert_eq!(report.records_skipped, 0);
  // Max updated_at 12:00 minus the 60 s overlap.
  assert_eq!(report.cursor, Some(dt("2024-03-01T11:59:00Z")));

  let cp = s.load_checkpoint(ORDERS_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::Success);
  assert_eq!(cp.cursor, report.cursor);
}

#[tokio::test]
async fn redelivered_data_leaves_the_store_byte_identical() {
  let s = store().await;
  let page = || {
    Ok(Page {
      items: vec![raw_order(1, "2024-03-01T10:00:00Z", &[(10, 100)])],
      next:  None,
    })
  };

  let first = OrderIngestor::new(Scripted::new(vec![page()]), s.clone(), tuning());
  first.sync().await.unwrap();
  let before = s.snapshot_orders().await.unwrap();

  let second = OrderIngestor::new(Scripted::new(vec![page()]), s.clone(), tuning());
  let SyncOutcome::Completed(report) = second.sync().await.unwrap() else {
    panic!("expected completed sync");
  };
  assert_eq!(report.orders_upserted, 0);
  assert_eq!(report.orders_stale, 1);
  assert_eq!(s.snapshot_orders().await.unwrap(), before);
}

#[tokio::test]
async fn held_lock_yields_a_skipped_outcome() {
  let s = store().await;
  let LockOutcome::Acquired(_held) = s
    .acquire_lock(ORDERS_SYNC, chrono::Duration::minutes(60))
    .await
    .unwrap()
  else {
    panic!("expected acquired lock");
  };

  let ingestor = OrderIngestor::new(Scripted::new(vec![]), s.clone(), tuning());
  match ingestor.sync().await.unwrap() {
    SyncOutcome::Skipped { .. } => {}
    SyncOutcome::Completed(_) => panic!("expected skipped outcome"),
  }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
  let s = store().await;
  let api = Scripted::new(vec![
    Err(transient()),
    Err(transient()),
    Ok(Page {
      items: vec![raw_order(1, "2024-03-01T10:00:00Z", &[(10, 100)])],
      next:  None,
    }),
  ]);

  let ingestor = OrderIngestor::new(api, s.clone(), tuning());
  let SyncOutcome::Completed(report) = ingestor.sync().await.unwrap() else {
    panic!("expected completed sync");
  };
  assert_eq!(report.orders_upserted, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_run_but_keep_committed_pages() {
  let s = store().await;
  let mut tuning = tuning();
  tuning.max_retries = 1;
  let api = Scripted::new(vec![
    // Full page with a next link, committed before the failure.
    Ok(Page {
      items: vec![
        raw_order(1, "2024-03-01T10:00:00Z", &[(10, 100)]),
        raw_order(2, "2024-03-01T11:00:00Z", &[(20, 200)]),
      ],
      next:  Some("https://api.example.com/orders?page_info=p2".into()),
    }),
    Err(transient()),
    Err(transient()),
  ]);

  let ingestor = OrderIngestor::new(api, s.clone(), tuning);
  let err = ingestor.sync().await.unwrap_err();
  assert!(matches!(err, Error::FetchExhausted { attempts: 2, .. }));

  let cp = s.load_checkpoint(ORDERS_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::Failed);
  assert_eq!(cp.cursor, Some(dt("2024-03-01T10:59:00Z")));
  assert!(cp.last_error.is_some());

  // The committed page survived.
  assert_eq!(s.snapshot_orders().await.unwrap().len(), 2);
}

#[tokio::test]
async fn non_retryable_status_fails_immediately() {
  let s = store().await;
  let api: Scripted<RawOrder> = Scripted::new(vec![Err(FetchError::Status {
    status: 401,
    body:   "bad token".into(),
  })]);

  let ingestor = OrderIngestor::new(api, s.clone(), tuning());
  let err = ingestor.sync().await.unwrap_err();
  assert!(matches!(err, Error::FetchExhausted { attempts: 1, .. }));
}

#[tokio::test]
async fn malformed_record_is_skipped_without_aborting_the_page() {
  let s = store().await;
  let bad: RawOrder = serde_json::from_value(serde_json::json!({
    "id": 666,
    "created_at": "2024-03-01T00:00:00Z",
    "updated_at": "2024-03-01T10:30:00Z",
    "financial_status": "authorized",
    "total_price": "5.00"
  }))
  .unwrap();
  let api = Scripted::new(vec![Ok(Page {
    items: vec![raw_order(1, "2024-03-01T10:00:00Z", &[(10, 100)]), bad],
    next:  None,
  })]);

  let ingestor = OrderIngestor::new(api, s.clone(), tuning());
  let SyncOutcome::Completed(report) = ingestor.sync().await.unwrap() else {
    panic!("expected completed sync");
  };
  assert_eq!(report.orders_upserted, 1);
  assert_eq!(report.records_skipped, 1);

  let cp = s.load_checkpoint(ORDERS_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::Success);
}

// ─── Catalog sync ────────────────────────────────────────────────────────────

#[tokio::test]
async fn catalog_sync_upserts_products_under_its_own_checkpoint() {
  let s = store().await;
  let api = Scripted::new(vec![Ok(Page {
    items: vec![
      raw_product(100, "2024-03-01T09:00:00Z"),
      raw_product(200, "2024-03-01T10:00:00Z"),
    ],
    next:  None,
  })]);

  let ingestor = CatalogIngestor::new(api, s.clone(), tuning());
  let SyncOutcome::Completed(report) = ingestor.sync().await.unwrap() else {
    panic!("expected completed sync");
  };
  assert_eq!(report.products_upserted, 2);
  assert_eq!(report.cursor, Some(dt("2024-03-01T09:59:00Z")));

  let cp = s.load_checkpoint(CATALOG_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::Success);
  // The order checkpoint is untouched.
  assert!(s.load_checkpoint(ORDERS_SYNC).await.unwrap().is_none());

  let (_, _, products, _) = s.counts().await.unwrap();
  assert_eq!(products, 2);
}
