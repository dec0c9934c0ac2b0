//! `selvage` binary.
//!
//! Reads `selvage.toml` (or the path given with `--config`), opens the
//! SQLite store, and runs one sync or analytics command per invocation.
//! Scheduling is an external concern; this binary is built to be run from
//! cron or by hand.

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use selvage_analytics::{Error as AnalyticsError, LiftIndex, ScoreInputs};
use selvage_core::{
  checkpoint::{CATALOG_SYNC, ORDERS_SYNC},
  featured::FeaturedEntry,
  store::OrderStore,
};
use selvage_store_sqlite::SqliteStore;
use selvage_sync::{
  CatalogIngestor, OrderIngestor, SyncOutcome, api::HttpCommerceApi,
};
use settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "Incremental order sync and weekly-specials analytics")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "selvage.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create or upgrade the store schema.
  Init,
  /// Run the incremental order sync.
  Sync {
    /// Also sync the product catalog.
    #[arg(long)]
    catalog: bool,
  },
  /// Show the sync checkpoints.
  Status,
  /// Print the co-purchase associations table as JSON.
  Associations {
    /// Minimum co-occurring orders per pair; defaults to the configured
    /// value.
    #[arg(long)]
    min_support: Option<u64>,
  },
  /// Print the RFM customer segments as JSON.
  Segments {
    /// Reference date, defaults to today.
    #[arg(long)]
    as_of: Option<NaiveDate>,
  },
  /// Rank weekly-specials candidates and print them as JSON.
  Recommend {
    #[arg(long, default_value_t = 5)]
    top_n: usize,
    /// Extra product ids to exclude, comma-separated.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<i64>,
  },
  /// Append products to the featured history once a selection is used.
  Feature {
    #[arg(long, value_delimiter = ',', required = true)]
    products: Vec<i64>,
    #[arg(long)]
    theme:    Option<String>,
  },
  /// Print the distinct purchaser emails of one product (suppression list).
  Buyers {
    #[arg(long)]
    product_id: i64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  match cli.command {
    Command::Init => {
      // Opening the store already ran the idempotent schema.
      info!(path = ?settings.store_path, "store initialised");
    }
    Command::Sync { catalog } => run_sync(&settings, &store, catalog).await?,
    Command::Status => run_status(&store).await?,
    Command::Associations { min_support } => {
      run_associations(&settings, &store, min_support).await?
    }
    Command::Segments { as_of } => run_segments(&settings, &store, as_of).await?,
    Command::Recommend { top_n, exclude } => {
      run_recommend(&settings, &store, top_n, &exclude).await?
    }
    Command::Feature { products, theme } => {
      let today = Utc::now().date_naive();
      let entries: Vec<FeaturedEntry> = products
        .iter()
        .map(|&product_id| FeaturedEntry {
          product_id,
          featured_on: today,
          campaign_theme: theme.clone(),
        })
        .collect();
      let count = entries.len();
      store.record_featured(entries).await?;
      info!(count, "recorded featured products");
    }
    Command::Buyers { product_id } => {
      for email in store.buyers_of_product(product_id).await? {
        println!("{email}");
      }
    }
  }

  Ok(())
}

fn commerce_api(settings: &Settings) -> anyhow::Result<HttpCommerceApi> {
  let base = settings
    .api_base_url
    .parse()
    .with_context(|| format!("bad api_base_url {:?}", settings.api_base_url))?;
  HttpCommerceApi::new(base, settings.api_token.clone())
    .context("failed to build HTTP client")
}

async fn run_sync(
  settings: &Settings,
  store: &SqliteStore,
  catalog: bool,
) -> anyhow::Result<()> {
  let ingestor =
    OrderIngestor::new(commerce_api(settings)?, store.clone(), settings.sync.clone());
  match ingestor.sync().await.context("order sync failed")? {
    SyncOutcome::Completed(report) => {
      println!("{}", serde_json::json!({
        "sync": ORDERS_SYNC,
        "pages_fetched": report.pages_fetched,
        "orders_upserted": report.orders_upserted,
        "line_items_upserted": report.line_items_upserted,
        "orders_stale": report.orders_stale,
        "records_skipped": report.records_skipped,
        "customers_refreshed": report.customers_refreshed,
        "cursor": report.cursor,
      }));
    }
    SyncOutcome::Skipped { started_at } => {
      println!("skipped: a sync started at {started_at} is still running");
    }
  }

  if catalog {
    let ingestor = CatalogIngestor::new(
      commerce_api(settings)?,
      store.clone(),
      settings.sync.clone(),
    );
    match ingestor.sync().await.context("catalog sync failed")? {
      SyncOutcome::Completed(report) => {
        println!("{}", serde_json::json!({
          "sync": CATALOG_SYNC,
          "pages_fetched": report.pages_fetched,
          "products_upserted": report.products_upserted,
          "records_skipped": report.records_skipped,
          "cursor": report.cursor,
        }));
      }
      SyncOutcome::Skipped { started_at } => {
        println!("skipped: a catalog sync started at {started_at} is still running");
      }
    }
  }

  Ok(())
}

async fn run_status(store: &SqliteStore) -> anyhow::Result<()> {
  for sync_type in [ORDERS_SYNC, CATALOG_SYNC] {
    match store.load_checkpoint(sync_type).await? {
      Some(cp) => {
        let cursor = cp
          .cursor
          .map_or_else(|| "-".to_owned(), |c| c.to_rfc3339());
        let error = cp.last_error.as_deref().unwrap_or("-");
        println!(
          "{sync_type}: status={} cursor={cursor} last_error={error}",
          cp.status.as_str()
        );
      }
      None => println!("{sync_type}: never run"),
    }
  }
  let (orders, line_items, products, customers) = store.counts().await?;
  println!(
    "rows: orders={orders} line_items={line_items} products={products} \
     customers={customers}"
  );
  Ok(())
}

async fn run_associations(
  settings: &Settings,
  store: &SqliteStore,
  min_support: Option<u64>,
) -> anyhow::Result<()> {
  let baskets = store.paid_baskets(None).await?;
  let min_support = min_support.unwrap_or(settings.selector.min_support_count);
  match selvage_analytics::associations(&baskets, min_support) {
    Ok(associations) => {
      println!("{}", serde_json::to_string_pretty(&associations)?);
    }
    Err(AnalyticsError::InsufficientData { reason }) => {
      warn!(%reason, "no associations available");
    }
  }
  Ok(())
}

async fn run_segments(
  settings: &Settings,
  store: &SqliteStore,
  as_of: Option<NaiveDate>,
) -> anyhow::Result<()> {
  let headers = store.paid_order_headers().await?;
  let as_of = match as_of {
    Some(date) => date
      .and_hms_opt(0, 0, 0)
      .context("invalid --as-of date")?
      .and_utc(),
    None => Utc::now(),
  };
  match selvage_analytics::segments(&headers, as_of, &settings.segments) {
    Ok(segments) => println!("{}", serde_json::to_string_pretty(&segments)?),
    Err(AnalyticsError::InsufficientData { reason }) => {
      warn!(%reason, "no segments available");
    }
  }
  Ok(())
}

async fn run_recommend(
  settings: &Settings,
  store: &SqliteStore,
  top_n: usize,
  exclude: &[i64],
) -> anyhow::Result<()> {
  let now = Utc::now();
  let window = Duration::days(settings.selector.momentum_window_days);

  let stats = store.product_stats().await?;
  let recent = store.product_sales_between(now - window, now).await?;
  let prior = store
    .product_sales_between(now - window - window, now - window)
    .await?;
  let featured = store.featured_history().await?;

  let baskets = store.paid_baskets(None).await?;
  let lifts = match selvage_analytics::associations(
    &baskets,
    settings.selector.min_support_count,
  ) {
    Ok(associations) => LiftIndex::from_associations(&associations),
    // No co-purchase data yet; scoring proceeds without complementarity.
    Err(AnalyticsError::InsufficientData { .. }) => LiftIndex::default(),
  };

  let inputs = ScoreInputs {
    stats:    &stats,
    recent:   &recent,
    prior:    &prior,
    lifts:    &lifts,
    featured: &featured,
    today:    now.date_naive(),
  };
  match selvage_analytics::recommend(
    &inputs,
    &settings.weights,
    &settings.selector,
    exclude,
    top_n,
  ) {
    Ok(recommendation) => {
      println!("{}", serde_json::to_string_pretty(&recommendation)?);
    }
    Err(AnalyticsError::InsufficientData { reason }) => {
      warn!(%reason, "no recommendation available");
    }
  }
  Ok(())
}
