//! SQL schema for the Selvage SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Financial records: rows are overwritten on re-sync when the source
-- reports a newer updated_at, and never deleted.
CREATE TABLE IF NOT EXISTS orders (
    order_id         INTEGER PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    financial_status TEXT NOT NULL,   -- 'pending'|'paid'|'refunded'|'partially_refunded'|'voided'
    total_minor      INTEGER NOT NULL,
    currency         TEXT NOT NULL,
    customer_id      INTEGER,
    email            TEXT,
    country          TEXT,
    province         TEXT,
    city             TEXT,
    utm_source       TEXT,
    utm_medium       TEXT,
    utm_campaign     TEXT,
    utm_content      TEXT,
    utm_term         TEXT,
    synced_at        TEXT NOT NULL
);

-- Owned by their order; title is a snapshot taken at order time.
CREATE TABLE IF NOT EXISTS line_items (
    order_id         INTEGER NOT NULL REFERENCES orders(order_id) ON DELETE CASCADE,
    line_item_id     INTEGER NOT NULL,
    product_id       INTEGER NOT NULL,
    title            TEXT NOT NULL,
    unit_price_minor INTEGER NOT NULL,
    quantity         INTEGER NOT NULL CHECK (quantity > 0),
    PRIMARY KEY (order_id, line_item_id)
);

CREATE TABLE IF NOT EXISTS products (
    product_id   INTEGER PRIMARY KEY,
    title        TEXT NOT NULL,
    handle       TEXT,
    created_at   TEXT,
    published_at TEXT,
    updated_at   TEXT,
    tags         TEXT NOT NULL DEFAULT '[]',
    synced_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS customers (
    customer_key      TEXT PRIMARY KEY,  -- source id, or lowercased email for guests
    customer_id       INTEGER,
    email             TEXT,
    country           TEXT,
    accepts_marketing INTEGER NOT NULL DEFAULT 0,
    total_spent_minor INTEGER,           -- derived cache, recomputable
    synced_at         TEXT NOT NULL
);

-- One row per sync type; the single-writer lock lives here.
CREATE TABLE IF NOT EXISTS sync_checkpoints (
    sync_type  TEXT PRIMARY KEY,
    cursor     TEXT,
    started_at TEXT,
    status     TEXT NOT NULL,            -- 'success'|'failed'|'in_progress'
    lock_token TEXT,
    last_error TEXT
);

-- Strictly append-only.
CREATE TABLE IF NOT EXISTS featured_history (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id     INTEGER NOT NULL,
    featured_on    TEXT NOT NULL,        -- ISO 8601 calendar date
    campaign_theme TEXT
);

CREATE INDEX IF NOT EXISTS orders_created_idx      ON orders(created_at);
CREATE INDEX IF NOT EXISTS orders_customer_idx     ON orders(customer_id);
CREATE INDEX IF NOT EXISTS orders_utm_campaign_idx ON orders(utm_campaign);
CREATE INDEX IF NOT EXISTS line_items_product_idx  ON line_items(product_id);
CREATE INDEX IF NOT EXISTS featured_product_idx    ON featured_history(product_id);

PRAGMA user_version = 1;
";
