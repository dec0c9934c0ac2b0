//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use selvage_core::{
  catalog::Customer,
  checkpoint::{CheckpointStatus, LockOutcome, ORDERS_SYNC},
  featured::FeaturedEntry,
  money::Money,
  order::{Attribution, FinancialStatus, LineItem, Order, OrderWithItems},
  store::OrderStore,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn dt(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn order(id: i64, created: &str, updated: &str, total: &str) -> OrderWithItems {
  OrderWithItems {
    order:      Order {
      order_id:         id,
      created_at:       dt(created),
      updated_at:       dt(updated),
      financial_status: FinancialStatus::Paid,
      total:            Money::parse_decimal(total).unwrap(),
      currency:         "USD".into(),
      customer_id:      None,
      email:            Some(format!("buyer{id}@example.com")),
      country:          Some("US".into()),
      province:         None,
      city:             None,
      attribution:      Attribution::default(),
    },
    line_items: Vec::new(),
    customer:   None,
  }
}

fn item(order_id: i64, line_id: i64, product_id: i64, price: &str, qty: u32) -> LineItem {
  LineItem {
    order_id,
    line_item_id: line_id,
    product_id,
    title: format!("Product {product_id}"),
    unit_price: Money::parse_decimal(price).unwrap(),
    quantity: qty,
  }
}

// ─── Order upserts ───────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_page_then_redeliver_is_noop() {
  let s = store().await;

  let mut o = order(1, "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", "25.00");
  o.line_items = vec![item(1, 10, 100, "25.00", 1)];

  let first = s.upsert_order_page(vec![o.clone()]).await.unwrap();
  assert_eq!(first.orders_upserted, 1);
  assert_eq!(first.line_items_upserted, 1);
  assert_eq!(first.orders_stale, 0);

  let before = s.snapshot_orders().await.unwrap();

  // Same page again: the stored updated_at is not older, so nothing changes.
  let second = s.upsert_order_page(vec![o]).await.unwrap();
  assert_eq!(second.orders_upserted, 0);
  assert_eq!(second.orders_stale, 1);

  let after = s.snapshot_orders().await.unwrap();
  assert_eq!(before, after);
}

#[tokio::test]
async fn newer_updated_at_overwrites_order_and_line_items() {
  let s = store().await;

  let mut v1 = order(1, "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", "25.00");
  v1.line_items = vec![item(1, 10, 100, "25.00", 1)];
  s.upsert_order_page(vec![v1]).await.unwrap();

  // A refund edit arrives: newer updated_at, different status and items.
  let mut v2 = order(1, "2024-01-01T00:00:00Z", "2024-01-05T00:00:00Z", "12.50");
  v2.order.financial_status = FinancialStatus::PartiallyRefunded;
  v2.line_items = vec![item(1, 11, 100, "12.50", 1), item(1, 12, 200, "0.00", 2)];

  let result = s.upsert_order_page(vec![v2]).await.unwrap();
  assert_eq!(result.orders_upserted, 1);

  let orders = s.snapshot_orders().await.unwrap();
  assert_eq!(orders.len(), 1);
  assert_eq!(
    orders[0].order.financial_status,
    FinancialStatus::PartiallyRefunded
  );
  assert_eq!(orders[0].order.total, Money::parse_decimal("12.50").unwrap());
  // Old line items are gone; the new set replaced them wholesale.
  let line_ids: Vec<i64> =
    orders[0].line_items.iter().map(|i| i.line_item_id).collect();
  assert_eq!(line_ids, vec![11, 12]);
}

#[tokio::test]
async fn older_updated_at_is_skipped() {
  let s = store().await;

  s.upsert_order_page(vec![order(
    1,
    "2024-01-01T00:00:00Z",
    "2024-01-05T00:00:00Z",
    "30.00",
  )])
  .await
  .unwrap();

  // An out-of-order redelivery of an older edit must not win.
  let stale = order(1, "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", "25.00");
  let result = s.upsert_order_page(vec![stale]).await.unwrap();
  assert_eq!(result.orders_stale, 1);

  let orders = s.snapshot_orders().await.unwrap();
  assert_eq!(orders[0].order.total, Money::parse_decimal("30.00").unwrap());
}

#[tokio::test]
async fn customer_snapshot_is_upserted_with_the_order() {
  let s = store().await;

  let mut o = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "40.00");
  o.customer = Some(Customer {
    customer_id:       Some(77),
    email:             Some("kay@example.com".into()),
    country:           Some("CA".into()),
    accepts_marketing: true,
    total_spent:       None,
  });
  s.upsert_order_page(vec![o]).await.unwrap();

  let (_, _, _, customers) = s.counts().await.unwrap();
  assert_eq!(customers, 1);
}

#[tokio::test]
async fn deleting_an_order_cascades_to_its_line_items() {
  let s = store().await;

  let mut o = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "20.00");
  o.line_items = vec![item(1, 10, 100, "10.00", 2)];
  s.upsert_order_page(vec![o]).await.unwrap();

  s.raw()
    .call(|conn| {
      conn.execute("DELETE FROM orders WHERE order_id = 1", [])?;
      Ok(())
    })
    .await
    .unwrap();

  let (orders, line_items, _, _) = s.counts().await.unwrap();
  assert_eq!(orders, 0);
  assert_eq!(line_items, 0);
}

// ─── Checkpoints & lock ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_acquire_creates_checkpoint_with_no_cursor() {
  let s = store().await;

  let outcome = s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap();
  let LockOutcome::Acquired(lock) = outcome else {
    panic!("expected acquired lock");
  };
  assert_eq!(lock.sync_type, ORDERS_SYNC);
  assert!(lock.cursor.is_none());
  assert!(!lock.reclaimed);

  let cp = s.load_checkpoint(ORDERS_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::InProgress);
}

#[tokio::test]
async fn fresh_lock_blocks_a_second_acquire() {
  let s = store().await;

  let LockOutcome::Acquired(_lock) =
    s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap()
  else {
    panic!("expected acquired lock");
  };

  match s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap() {
    LockOutcome::Busy { .. } => {}
    other => panic!("expected busy, got {other:?}"),
  }
}

#[tokio::test]
async fn stale_lock_is_reclaimed_and_the_loser_cannot_write() {
  let s = store().await;

  let LockOutcome::Acquired(old) =
    s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap()
  else {
    panic!("expected acquired lock");
  };

  // With a zero staleness threshold the running lock is immediately stale.
  let LockOutcome::Acquired(new) =
    s.acquire_lock(ORDERS_SYNC, Duration::zero()).await.unwrap()
  else {
    panic!("expected reclaimed lock");
  };
  assert!(new.reclaimed);

  // The superseded run must fail on every checkpoint write.
  let err = s
    .advance_cursor(&old, dt("2024-01-01T00:00:00Z"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::LockLost(_)));
  let err = s.commit_lock(&old).await.unwrap_err();
  assert!(matches!(err, Error::LockLost(_)));

  // The new owner still can.
  s.advance_cursor(&new, dt("2024-01-01T00:00:00Z")).await.unwrap();
  s.commit_lock(&new).await.unwrap();
}

#[tokio::test]
async fn commit_clears_lock_and_next_run_resumes_from_cursor() {
  let s = store().await;

  let LockOutcome::Acquired(lock) =
    s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap()
  else {
    panic!("expected acquired lock");
  };
  s.advance_cursor(&lock, dt("2024-03-01T12:00:00Z")).await.unwrap();
  s.commit_lock(&lock).await.unwrap();

  let cp = s.load_checkpoint(ORDERS_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::Success);
  assert_eq!(cp.cursor, Some(dt("2024-03-01T12:00:00Z")));
  assert!(cp.last_error.is_none());

  let LockOutcome::Acquired(next) =
    s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap()
  else {
    panic!("expected acquired lock");
  };
  assert_eq!(next.cursor, Some(dt("2024-03-01T12:00:00Z")));
  assert!(!next.reclaimed);
}

#[tokio::test]
async fn failed_release_keeps_the_last_committed_cursor() {
  let s = store().await;

  let LockOutcome::Acquired(lock) =
    s.acquire_lock(ORDERS_SYNC, Duration::minutes(60)).await.unwrap()
  else {
    panic!("expected acquired lock");
  };
  s.advance_cursor(&lock, dt("2024-03-01T12:00:00Z")).await.unwrap();
  s.release_failed(&lock, "remote: 500 after retries").await.unwrap();

  let cp = s.load_checkpoint(ORDERS_SYNC).await.unwrap().unwrap();
  assert_eq!(cp.status, CheckpointStatus::Failed);
  assert_eq!(cp.cursor, Some(dt("2024-03-01T12:00:00Z")));
  assert_eq!(cp.last_error.as_deref(), Some("remote: 500 after retries"));
}

#[tokio::test]
async fn corrupt_cursor_is_fatal_on_acquire() {
  let s = store().await;

  s.raw()
    .call(|conn| {
      conn.execute(
        "INSERT INTO sync_checkpoints (sync_type, cursor, status)
         VALUES (?1, 'not-a-timestamp', 'success')",
        rusqlite::params![ORDERS_SYNC],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s
    .acquire_lock(ORDERS_SYNC, Duration::minutes(60))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::CheckpointCorruption { .. }));

  // The corrupt row was not claimed.
  let cp = s.load_checkpoint(ORDERS_SYNC).await;
  assert!(cp.is_err());
}

// ─── Featured history ────────────────────────────────────────────────────────

#[tokio::test]
async fn featured_history_is_append_only_and_ordered() {
  let s = store().await;

  let day = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
  s.record_featured(vec![FeaturedEntry {
    product_id:     200,
    featured_on:    day("2024-02-05"),
    campaign_theme: Some("winter".into()),
  }])
  .await
  .unwrap();
  s.record_featured(vec![FeaturedEntry {
    product_id:     100,
    featured_on:    day("2024-01-08"),
    campaign_theme: None,
  }])
  .await
  .unwrap();

  let history = s.featured_history().await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].product_id, 100);
  assert_eq!(history[1].product_id, 200);
  assert_eq!(history[1].campaign_theme.as_deref(), Some("winter"));
}

// ─── Analytics reads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn paid_order_headers_skip_unpaid_and_keyless_orders() {
  let s = store().await;

  let paid = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "25.00");
  let mut refunded =
    order(2, "2024-01-02T00:00:00Z", "2024-01-02T00:00:00Z", "30.00");
  refunded.order.financial_status = FinancialStatus::Refunded;
  let mut keyless =
    order(3, "2024-01-03T00:00:00Z", "2024-01-03T00:00:00Z", "10.00");
  keyless.order.email = None;
  let mut by_id = order(4, "2024-01-04T00:00:00Z", "2024-01-04T00:00:00Z", "15.00");
  by_id.order.customer_id = Some(42);

  s.upsert_order_page(vec![paid, refunded, keyless, by_id])
    .await
    .unwrap();

  let headers = s.paid_order_headers().await.unwrap();
  assert_eq!(headers.len(), 2);
  assert_eq!(headers[0].customer_key, "buyer1@example.com");
  assert_eq!(headers[1].customer_key, "42");
}

#[tokio::test]
async fn paid_baskets_dedup_products_and_count_all_paid_orders() {
  let s = store().await;

  // Order 1: two lines of the same product plus one other.
  let mut o1 = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "50.00");
  o1.line_items = vec![
    item(1, 10, 100, "10.00", 1),
    item(1, 11, 100, "10.00", 2),
    item(1, 12, 200, "20.00", 1),
  ];
  // Order 2: single item. In the denominator, and a one-product basket.
  let mut o2 = order(2, "2024-01-02T00:00:00Z", "2024-01-02T00:00:00Z", "10.00");
  o2.line_items = vec![item(2, 20, 100, "10.00", 1)];
  // Order 3: pending, ignored entirely.
  let mut o3 = order(3, "2024-01-03T00:00:00Z", "2024-01-03T00:00:00Z", "99.00");
  o3.order.financial_status = FinancialStatus::Pending;
  o3.line_items = vec![item(3, 30, 300, "99.00", 1)];

  s.upsert_order_page(vec![o1, o2, o3]).await.unwrap();

  let data = s.paid_baskets(None).await.unwrap();
  assert_eq!(data.total_orders, 2);
  assert_eq!(data.baskets.len(), 2);
  assert_eq!(data.baskets[0].product_ids, vec![100, 200]);
  assert_eq!(data.baskets[1].product_ids, vec![100]);

  // The since filter drops the earlier order from both baskets and count.
  let windowed = s.paid_baskets(Some(dt("2024-01-02T00:00:00Z"))).await.unwrap();
  assert_eq!(windowed.total_orders, 1);
  assert_eq!(windowed.baskets.len(), 1);
  assert_eq!(windowed.baskets[0].order_id, 2);
}

#[tokio::test]
async fn product_sales_window_is_half_open_and_skips_free_lines() {
  let s = store().await;

  let mut inside = order(1, "2024-02-10T00:00:00Z", "2024-02-10T00:00:00Z", "30.00");
  inside.line_items = vec![
    item(1, 10, 100, "10.00", 3),
    // Zero-price giveaway line, excluded from revenue analytics.
    item(1, 11, 900, "0.00", 1),
  ];
  let mut at_end = order(2, "2024-03-01T00:00:00Z", "2024-03-01T00:00:00Z", "10.00");
  at_end.line_items = vec![item(2, 20, 100, "10.00", 1)];

  s.upsert_order_page(vec![inside, at_end]).await.unwrap();

  let sales = s
    .product_sales_between(dt("2024-02-01T00:00:00Z"), dt("2024-03-01T00:00:00Z"))
    .await
    .unwrap();
  assert_eq!(sales.len(), 1);
  assert_eq!(sales[0].product_id, 100);
  assert_eq!(sales[0].units, 3);
  assert_eq!(sales[0].revenue, Money::parse_decimal("30.00").unwrap());
  assert_eq!(sales[0].orders, 1);
}

#[tokio::test]
async fn product_stats_use_max_observed_unit_price() {
  let s = store().await;

  let mut o1 = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "18.00");
  o1.line_items = vec![item(1, 10, 100, "18.00", 1)];
  // Later sale at a discount; the representative price stays at 18.00.
  let mut o2 = order(2, "2024-02-01T00:00:00Z", "2024-02-01T00:00:00Z", "12.00");
  o2.line_items = vec![item(2, 20, 100, "12.00", 2)];

  s.upsert_order_page(vec![o1, o2]).await.unwrap();

  let stats = s.product_stats().await.unwrap();
  assert_eq!(stats.len(), 1);
  assert_eq!(stats[0].lifetime_units, 3);
  assert_eq!(stats[0].unit_price, Money::parse_decimal("18.00").unwrap());
}

#[tokio::test]
async fn refresh_customer_totals_sums_paid_orders_per_key() {
  let s = store().await;

  let customer = Customer {
    customer_id:       Some(42),
    email:             Some("kay@example.com".into()),
    country:           None,
    accepts_marketing: false,
    total_spent:       None,
  };
  let mut o1 = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "25.00");
  o1.order.customer_id = Some(42);
  o1.customer = Some(customer.clone());
  let mut o2 = order(2, "2024-01-02T00:00:00Z", "2024-01-02T00:00:00Z", "15.00");
  o2.order.customer_id = Some(42);
  o2.customer = Some(customer);
  // A refund does not count toward lifetime spend.
  let mut o3 = order(3, "2024-01-03T00:00:00Z", "2024-01-03T00:00:00Z", "99.00");
  o3.order.customer_id = Some(42);
  o3.order.financial_status = FinancialStatus::Refunded;

  s.upsert_order_page(vec![o1, o2, o3]).await.unwrap();
  let updated = s.refresh_customer_totals().await.unwrap();
  assert_eq!(updated, 1);

  let total: i64 = s
    .raw()
    .call(|conn| {
      Ok(conn.query_row(
        "SELECT total_spent_minor FROM customers WHERE customer_key = '42'",
        [],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(total, 4000);
}

#[tokio::test]
async fn buyers_of_product_are_distinct_lowercased_emails() {
  let s = store().await;

  let mut o1 = order(1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", "10.00");
  o1.order.email = Some("Kay@Example.com".into());
  o1.line_items = vec![item(1, 10, 100, "10.00", 1)];
  let mut o2 = order(2, "2024-01-02T00:00:00Z", "2024-01-02T00:00:00Z", "10.00");
  o2.order.email = Some("kay@example.com".into());
  o2.line_items = vec![item(2, 20, 100, "10.00", 1)];
  let mut o3 = order(3, "2024-01-03T00:00:00Z", "2024-01-03T00:00:00Z", "10.00");
  o3.order.email = Some("jo@example.com".into());
  o3.line_items = vec![item(3, 30, 200, "10.00", 1)];

  s.upsert_order_page(vec![o1, o2, o3]).await.unwrap();

  let buyers = s.buyers_of_product(100).await.unwrap();
  assert_eq!(buyers, vec!["kay@example.com"]);
}
