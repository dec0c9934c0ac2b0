//! [`SqliteStore`] — the SQLite implementation of [`OrderStore`].

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use selvage_core::{
  catalog::Product,
  checkpoint::{CheckpointStatus, LockOutcome, SyncCheckpoint, SyncLock},
  featured::FeaturedEntry,
  money::Money,
  order::OrderWithItems,
  store::{
    Basket, BasketData, OrderStore, PageUpsert, PaidOrderHeader, ProductSales,
    ProductStats,
  },
};

use crate::{
  encode::{
    decode_date, decode_dt, encode_date, encode_dt, encode_tags, RawLineItemRow,
    RawOrderRow,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Selvage order store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Raw acquire outcome produced inside the database transaction; decoded to
/// [`LockOutcome`] (or a corruption error) outside it.
enum AcquireRaw {
  Acquired { cursor: Option<String>, reclaimed: bool },
  Busy { started_at: String },
  Corrupt { raw: String },
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  #[cfg(test)]
  pub(crate) fn raw(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Row counts of the main tables, for status reporting.
  pub async fn counts(&self) -> Result<(u64, u64, u64, u64)> {
    let counts = self
      .conn
      .call(|conn| {
        let one = |conn: &rusqlite::Connection, table: &str| -> rusqlite::Result<u64> {
          conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        Ok((
          one(conn, "orders")?,
          one(conn, "line_items")?,
          one(conn, "products")?,
          one(conn, "customers")?,
        ))
      })
      .await?;
    Ok(counts)
  }

  /// Dump every order with its line items, ordered by id. Diagnostic read;
  /// the idempotency tests compare these snapshots across sync runs.
  pub async fn snapshot_orders(&self) -> Result<Vec<OrderWithItems>> {
    let (order_rows, item_rows): (Vec<RawOrderRow>, Vec<RawLineItemRow>) = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT order_id, created_at, updated_at, financial_status,
                  total_minor, currency, customer_id, email,
                  country, province, city,
                  utm_source, utm_medium, utm_campaign, utm_content, utm_term
           FROM orders ORDER BY order_id",
        )?;
        let orders = stmt
          .query_map([], |row| {
            Ok(RawOrderRow {
              order_id:         row.get(0)?,
              created_at:       row.get(1)?,
              updated_at:       row.get(2)?,
              financial_status: row.get(3)?,
              total_minor:      row.get(4)?,
              currency:         row.get(5)?,
              customer_id:      row.get(6)?,
              email:            row.get(7)?,
              country:          row.get(8)?,
              province:         row.get(9)?,
              city:             row.get(10)?,
              utm_source:       row.get(11)?,
              utm_medium:       row.get(12)?,
              utm_campaign:     row.get(13)?,
              utm_content:      row.get(14)?,
              utm_term:         row.get(15)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT order_id, line_item_id, product_id, title,
                  unit_price_minor, quantity
           FROM line_items ORDER BY order_id, line_item_id",
        )?;
        let items = stmt
          .query_map([], |row| {
            Ok(RawLineItemRow {
              order_id:         row.get(0)?,
              line_item_id:     row.get(1)?,
              product_id:       row.get(2)?,
              title:            row.get(3)?,
              unit_price_minor: row.get(4)?,
              quantity:         row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((orders, items))
      })
      .await?;

    let mut result: Vec<OrderWithItems> = order_rows
      .into_iter()
      .map(|raw| {
        Ok(OrderWithItems {
          order:      raw.into_order()?,
          line_items: Vec::new(),
          customer:   None,
        })
      })
      .collect::<Result<_>>()?;

    for raw in item_rows {
      let item = raw.into_line_item()?;
      if let Some(owner) = result
        .iter_mut()
        .find(|o| o.order.order_id == item.order_id)
      {
        owner.line_items.push(item);
      }
    }

    Ok(result)
  }
}

// ─── OrderStore impl ─────────────────────────────────────────────────────────

impl OrderStore for SqliteStore {
  type Error = Error;

  // ── Ingestion writes ──────────────────────────────────────────────────────

  async fn upsert_order_page(&self, page: Vec<OrderWithItems>) -> Result<PageUpsert> {
    let synced_at = encode_dt(Utc::now());

    let upsert = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut result = PageUpsert::default();

        for entry in page {
          let order = &entry.order;

          // Freshness check: only a strictly newer updated_at overwrites.
          let stored_updated: Option<String> = tx
            .query_row(
              "SELECT updated_at FROM orders WHERE order_id = ?1",
              rusqlite::params![order.order_id],
              |r| r.get(0),
            )
            .optional()?;

          if let Some(stored) = stored_updated {
            // An unparseable stored value is overwritten (self-healing).
            let is_stale = DateTime::parse_from_rfc3339(&stored)
              .map(|dt| dt.with_timezone(&Utc) >= order.updated_at)
              .unwrap_or(false);
            if is_stale {
              result.orders_stale += 1;
              continue;
            }
          }

          tx.execute(
            "INSERT INTO orders (
               order_id, created_at, updated_at, financial_status,
               total_minor, currency, customer_id, email,
               country, province, city,
               utm_source, utm_medium, utm_campaign, utm_content, utm_term,
               synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(order_id) DO UPDATE SET
               created_at = excluded.created_at,
               updated_at = excluded.updated_at,
               financial_status = excluded.financial_status,
               total_minor = excluded.total_minor,
               currency = excluded.currency,
               customer_id = excluded.customer_id,
               email = excluded.email,
               country = excluded.country,
               province = excluded.province,
               city = excluded.city,
               utm_source = excluded.utm_source,
               utm_medium = excluded.utm_medium,
               utm_campaign = excluded.utm_campaign,
               utm_content = excluded.utm_content,
               utm_term = excluded.utm_term,
               synced_at = excluded.synced_at",
            rusqlite::params![
              order.order_id,
              encode_dt(order.created_at),
              encode_dt(order.updated_at),
              order.financial_status.as_str(),
              order.total.minor_units(),
              order.currency,
              order.customer_id,
              order.email,
              order.country,
              order.province,
              order.city,
              order.attribution.utm_source,
              order.attribution.utm_medium,
              order.attribution.utm_campaign,
              order.attribution.utm_content,
              order.attribution.utm_term,
              synced_at,
            ],
          )?;
          result.orders_upserted += 1;

          // Line items are replaced wholesale with the order.
          tx.execute(
            "DELETE FROM line_items WHERE order_id = ?1",
            rusqlite::params![order.order_id],
          )?;
          for item in &entry.line_items {
            tx.execute(
              "INSERT INTO line_items (
                 order_id, line_item_id, product_id, title,
                 unit_price_minor, quantity
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
              rusqlite::params![
                item.order_id,
                item.line_item_id,
                item.product_id,
                item.title,
                item.unit_price.minor_units(),
                i64::from(item.quantity),
              ],
            )?;
            result.line_items_upserted += 1;
          }

          if let Some(customer) = &entry.customer
            && let Some(key) = customer.key()
          {
            tx.execute(
              "INSERT INTO customers (
                 customer_key, customer_id, email, country,
                 accepts_marketing, synced_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(customer_key) DO UPDATE SET
                 customer_id = excluded.customer_id,
                 email = excluded.email,
                 country = excluded.country,
                 accepts_marketing = excluded.accepts_marketing,
                 synced_at = excluded.synced_at",
              rusqlite::params![
                key,
                customer.customer_id,
                customer.email,
                customer.country,
                customer.accepts_marketing as i64,
                synced_at,
              ],
            )?;
          }
        }

        tx.commit()?;
        Ok(result)
      })
      .await?;

    Ok(upsert)
  }

  async fn upsert_products(&self, products: Vec<Product>) -> Result<u64> {
    let synced_at = encode_dt(Utc::now());

    let tags_encoded: Vec<String> = products
      .iter()
      .map(|p| encode_tags(&p.tags))
      .collect::<Result<_>>()?;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0u64;

        for (product, tags) in products.iter().zip(tags_encoded) {
          tx.execute(
            "INSERT INTO products (
               product_id, title, handle, created_at, published_at,
               updated_at, tags, synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(product_id) DO UPDATE SET
               title = excluded.title,
               handle = excluded.handle,
               created_at = excluded.created_at,
               published_at = excluded.published_at,
               updated_at = excluded.updated_at,
               tags = excluded.tags,
               synced_at = excluded.synced_at",
            rusqlite::params![
              product.product_id,
              product.title,
              product.handle,
              product.created_at.map(encode_dt),
              product.published_at.map(encode_dt),
              product.updated_at.map(encode_dt),
              tags,
              synced_at,
            ],
          )?;
          written += 1;
        }

        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn refresh_customer_totals(&self) -> Result<u64> {
    let updated = self
      .conn
      .call(|conn| {
        let changed = conn.execute(
          "UPDATE customers SET total_spent_minor = COALESCE((
             SELECT SUM(o.total_minor) FROM orders o
             WHERE o.financial_status = 'paid'
               AND (CAST(o.customer_id AS TEXT) = customers.customer_key
                    OR (o.customer_id IS NULL
                        AND lower(o.email) = customers.customer_key))
           ), 0)",
          [],
        )?;
        Ok(changed as u64)
      })
      .await?;
    Ok(updated)
  }

  // ── Checkpoints & lock ────────────────────────────────────────────────────

  async fn load_checkpoint(&self, sync_type: &str) -> Result<Option<SyncCheckpoint>> {
    let sync_type = sync_type.to_owned();
    let sync_type_ret = sync_type.clone();

    let raw: Option<(Option<String>, Option<String>, String, Option<String>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT cursor, started_at, status, last_error
               FROM sync_checkpoints WHERE sync_type = ?1",
              rusqlite::params![sync_type],
              |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let Some((cursor_raw, started_raw, status_raw, last_error)) = raw else {
      return Ok(None);
    };

    let cursor = cursor_raw
      .map(|raw| {
        decode_dt(&raw).map_err(|_| Error::CheckpointCorruption {
          sync_type: sync_type_ret.clone(),
          raw,
        })
      })
      .transpose()?;
    let started_at = started_raw.as_deref().map(decode_dt).transpose()?;
    let status = CheckpointStatus::parse(&status_raw).map_err(Error::Core)?;

    Ok(Some(SyncCheckpoint {
      sync_type: sync_type_ret,
      cursor,
      started_at,
      status,
      last_error,
    }))
  }

  async fn acquire_lock(&self, sync_type: &str, staleness: Duration) -> Result<LockOutcome> {
    let sync_type = sync_type.to_owned();
    let sync_type_ret = sync_type.clone();
    let token = Uuid::new_v4();
    let token_str = token.hyphenated().to_string();
    let now = Utc::now();
    let now_str = encode_dt(now);

    let raw = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(Option<String>, Option<String>, String)> = tx
          .query_row(
            "SELECT cursor, started_at, status FROM sync_checkpoints
             WHERE sync_type = ?1",
            rusqlite::params![sync_type],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;

        let outcome = match row {
          None => {
            tx.execute(
              "INSERT INTO sync_checkpoints
                 (sync_type, cursor, started_at, status, lock_token, last_error)
               VALUES (?1, NULL, ?2, 'in_progress', ?3, NULL)",
              rusqlite::params![sync_type, now_str, token_str],
            )?;
            AcquireRaw::Acquired { cursor: None, reclaimed: false }
          }

          Some((cursor, started_at, status)) => {
            // Validate the cursor before claiming anything: a corrupt
            // checkpoint must surface to the operator, not get locked.
            if let Some(raw) = &cursor
              && DateTime::parse_from_rfc3339(raw).is_err()
            {
              return Ok(AcquireRaw::Corrupt { raw: raw.clone() });
            }

            let mut reclaimed = false;
            if status == "in_progress" {
              let Some(started_raw) = started_at else {
                return Ok(AcquireRaw::Corrupt {
                  raw: "in_progress with no started_at".to_owned(),
                });
              };
              let Ok(started) = DateTime::parse_from_rfc3339(&started_raw) else {
                return Ok(AcquireRaw::Corrupt { raw: started_raw });
              };
              if now - started.with_timezone(&Utc) < staleness {
                return Ok(AcquireRaw::Busy { started_at: started_raw });
              }
              reclaimed = true;
            }

            tx.execute(
              "UPDATE sync_checkpoints
               SET status = 'in_progress', started_at = ?2, lock_token = ?3
               WHERE sync_type = ?1",
              rusqlite::params![sync_type, now_str, token_str],
            )?;
            AcquireRaw::Acquired { cursor, reclaimed }
          }
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match raw {
      AcquireRaw::Acquired { cursor, reclaimed } => {
        let cursor = cursor.as_deref().map(decode_dt).transpose()?;
        Ok(LockOutcome::Acquired(SyncLock {
          sync_type: sync_type_ret,
          token,
          cursor,
          reclaimed,
        }))
      }
      AcquireRaw::Busy { started_at } => Ok(LockOutcome::Busy {
        started_at: decode_dt(&started_at)?,
      }),
      AcquireRaw::Corrupt { raw } => Err(Error::CheckpointCorruption {
        sync_type: sync_type_ret,
        raw,
      }),
    }
  }

  async fn advance_cursor(&self, lock: &SyncLock, cursor: DateTime<Utc>) -> Result<()> {
    let sync_type = lock.sync_type.clone();
    let token_str = lock.token.hyphenated().to_string();
    let cursor_str = encode_dt(cursor);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sync_checkpoints SET cursor = ?3
           WHERE sync_type = ?1 AND lock_token = ?2 AND status = 'in_progress'",
          rusqlite::params![sync_type, token_str, cursor_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::LockLost(lock.sync_type.clone()));
    }
    Ok(())
  }

  async fn commit_lock(&self, lock: &SyncLock) -> Result<()> {
    let sync_type = lock.sync_type.clone();
    let token_str = lock.token.hyphenated().to_string();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sync_checkpoints
           SET status = 'success', lock_token = NULL, last_error = NULL
           WHERE sync_type = ?1 AND lock_token = ?2",
          rusqlite::params![sync_type, token_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::LockLost(lock.sync_type.clone()));
    }
    Ok(())
  }

  async fn release_failed(&self, lock: &SyncLock, error: &str) -> Result<()> {
    let sync_type = lock.sync_type.clone();
    let token_str = lock.token.hyphenated().to_string();
    let error = error.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sync_checkpoints
           SET status = 'failed', lock_token = NULL, last_error = ?3
           WHERE sync_type = ?1 AND lock_token = ?2",
          rusqlite::params![sync_type, token_str, error],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::LockLost(lock.sync_type.clone()));
    }
    Ok(())
  }

  // ── Featured history ──────────────────────────────────────────────────────

  async fn record_featured(&self, entries: Vec<FeaturedEntry>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for entry in &entries {
          tx.execute(
            "INSERT INTO featured_history (product_id, featured_on, campaign_theme)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![
              entry.product_id,
              encode_date(entry.featured_on),
              entry.campaign_theme,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn featured_history(&self) -> Result<Vec<FeaturedEntry>> {
    let raws: Vec<(i64, String, Option<String>)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT product_id, featured_on, campaign_theme
           FROM featured_history ORDER BY featured_on, product_id, id",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(product_id, featured_on, campaign_theme)| {
        Ok(FeaturedEntry {
          product_id,
          featured_on: decode_date(&featured_on)?,
          campaign_theme,
        })
      })
      .collect()
  }

  // ── Analytics reads ───────────────────────────────────────────────────────

  async fn paid_order_headers(&self) -> Result<Vec<PaidOrderHeader>> {
    let raws: Vec<(String, String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT COALESCE(CAST(customer_id AS TEXT), lower(email)),
                  created_at, total_minor
           FROM orders
           WHERE financial_status = 'paid'
             AND (customer_id IS NOT NULL
                  OR (email IS NOT NULL AND email != ''))
           ORDER BY order_id",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(customer_key, created_at, total_minor)| {
        Ok(PaidOrderHeader {
          customer_key,
          created_at: decode_dt(&created_at)?,
          total: Money::from_minor(total_minor),
        })
      })
      .collect()
  }

  async fn paid_baskets(&self, since: Option<DateTime<Utc>>) -> Result<BasketData> {
    let since_str = since.map(encode_dt);

    let (total_orders, rows): (u64, Vec<(i64, i64)>) = self
      .conn
      .call(move |conn| {
        let total: u64 = if let Some(s) = &since_str {
          conn.query_row(
            "SELECT COUNT(*) FROM orders
             WHERE financial_status = 'paid' AND created_at >= ?1",
            rusqlite::params![s],
            |r| r.get(0),
          )?
        } else {
          conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE financial_status = 'paid'",
            [],
            |r| r.get(0),
          )?
        };

        let sql = format!(
          "SELECT o.order_id, li.product_id
           FROM orders o JOIN line_items li ON li.order_id = o.order_id
           WHERE o.financial_status = 'paid'{}
           GROUP BY o.order_id, li.product_id
           ORDER BY o.order_id, li.product_id",
          if since_str.is_some() { " AND o.created_at >= ?1" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(s) = &since_str {
          stmt
            .query_map(rusqlite::params![s], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok((total, rows))
      })
      .await?;

    let mut baskets: Vec<Basket> = Vec::new();
    for (order_id, product_id) in rows {
      match baskets.last_mut() {
        Some(last) if last.order_id == order_id => last.product_ids.push(product_id),
        _ => baskets.push(Basket { order_id, product_ids: vec![product_id] }),
      }
    }

    Ok(BasketData { total_orders, baskets })
  }

  async fn product_sales_between(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<ProductSales>> {
    let start_str = encode_dt(start);
    let end_str = encode_dt(end);

    let rows: Vec<(i64, String, i64, i64, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT li.product_id, MAX(li.title),
                  SUM(li.quantity),
                  SUM(li.unit_price_minor * li.quantity),
                  COUNT(DISTINCT o.order_id)
           FROM line_items li
           JOIN orders o ON o.order_id = li.order_id
           WHERE o.financial_status = 'paid'
             AND o.created_at >= ?1 AND o.created_at < ?2
             AND li.unit_price_minor > 0
           GROUP BY li.product_id
           ORDER BY li.product_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![start_str, end_str], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(product_id, title, units, revenue_minor, orders)| ProductSales {
          product_id,
          title,
          units: units.max(0) as u64,
          revenue: Money::from_minor(revenue_minor),
          orders: orders.max(0) as u64,
        })
        .collect(),
    )
  }

  async fn product_stats(&self) -> Result<Vec<ProductStats>> {
    let rows: Vec<(i64, String, i64, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT li.product_id, MAX(li.title),
                  SUM(li.quantity), MAX(li.unit_price_minor)
           FROM line_items li
           JOIN orders o ON o.order_id = li.order_id
           WHERE o.financial_status = 'paid'
             AND li.unit_price_minor > 0
           GROUP BY li.product_id
           ORDER BY li.product_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(product_id, title, units, price_minor)| ProductStats {
          product_id,
          title,
          lifetime_units: units.max(0) as u64,
          unit_price: Money::from_minor(price_minor),
        })
        .collect(),
    )
  }

  async fn buyers_of_product(&self, product_id: i64) -> Result<Vec<String>> {
    let emails = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT lower(trim(o.email))
           FROM orders o
           JOIN line_items li ON li.order_id = o.order_id
           WHERE li.product_id = ?1
             AND o.email IS NOT NULL AND o.email != ''
           ORDER BY 1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![product_id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(emails)
  }
}
