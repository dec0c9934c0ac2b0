//! Remote commerce API client.
//!
//! The [`OrdersApi`] and [`CatalogApi`] traits are the seam the ingestors are
//! generic over; [`HttpCommerceApi`] is the production implementation.
//! Pagination follows RFC 5988 `Link: <...>; rel="next"` headers; the first
//! request of a run filters on `updated_at_min` and sorts ascending by
//! update time.

use std::{future::Future, time::Duration};

use reqwest::{StatusCode, Url, header::HeaderMap};

use crate::{
  FetchError,
  payload::{RawOrder, RawProduct},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_HEADER: &str = "X-Access-Token";

// ─── Requests & pages ────────────────────────────────────────────────────────

/// Parameters of one page fetch. When `next` is set it is a complete URL
/// from the previous page's `Link` header and the other fields are ignored.
#[derive(Debug, Clone)]
pub struct PageRequest {
  pub updated_since: Option<chrono::DateTime<chrono::Utc>>,
  pub page_size:     u32,
  pub next:          Option<String>,
}

/// One fetched page plus the link to the next one, if any.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub next:  Option<String>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

pub trait OrdersApi: Send + Sync {
  fn fetch_orders(
    &self,
    req: PageRequest,
  ) -> impl Future<Output = Result<Page<RawOrder>, FetchError>> + Send + '_;
}

pub trait CatalogApi: Send + Sync {
  fn fetch_products(
    &self,
    req: PageRequest,
  ) -> impl Future<Output = Result<Page<RawProduct>, FetchError>> + Send + '_;
}

// ─── HTTP implementation ─────────────────────────────────────────────────────

/// reqwest-backed client for the commerce REST API.
pub struct HttpCommerceApi {
  client: reqwest::Client,
  base:   Url,
  token:  String,
}

impl HttpCommerceApi {
  pub fn new(base: Url, token: String) -> reqwest::Result<Self> {
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    Ok(Self { client, base, token })
  }

  fn page_url(&self, endpoint: &str, req: &PageRequest) -> Result<Url, FetchError> {
    if let Some(next) = &req.next {
      return Url::parse(next)
        .map_err(|e| FetchError::Decode(format!("bad next link {next:?}: {e}")));
    }

    let mut url = self
      .base
      .join(endpoint)
      .map_err(|e| FetchError::Decode(format!("bad endpoint {endpoint:?}: {e}")))?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("page_size", &req.page_size.to_string());
      query.append_pair("order", "updated_at asc");
      if let Some(since) = req.updated_since {
        query.append_pair("updated_at_min", &since.to_rfc3339());
      }
    }
    Ok(url)
  }

  /// GET one page and pull `key` out of the response envelope.
  async fn get_page<T>(
    &self,
    endpoint: &str,
    key: &str,
    req: PageRequest,
  ) -> Result<Page<T>, FetchError>
  where
    T: serde::de::DeserializeOwned,
  {
    let url = self.page_url(endpoint, &req)?;

    let resp = self
      .client
      .get(url)
      .header(AUTH_HEADER, &self.token)
      .send()
      .await
      .map_err(|e| FetchError::Transient {
        message:     e.to_string(),
        retry_after: None,
      })?;

    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
      return Err(FetchError::Transient {
        message:     format!("remote returned {status}"),
        retry_after: retry_after(resp.headers()),
      });
    }
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(FetchError::Status { status: status.as_u16(), body });
    }

    let next = next_link(resp.headers());
    let mut envelope: serde_json::Value = resp
      .json()
      .await
      .map_err(|e| FetchError::Decode(e.to_string()))?;
    let items = match envelope.get_mut(key) {
      Some(value) => serde_json::from_value(value.take())
        .map_err(|e| FetchError::Decode(format!("{key}: {e}")))?,
      None => Vec::new(),
    };

    Ok(Page { items, next })
  }
}

impl OrdersApi for HttpCommerceApi {
  async fn fetch_orders(&self, req: PageRequest) -> Result<Page<RawOrder>, FetchError> {
    self.get_page("orders", "orders", req).await
  }
}

impl CatalogApi for HttpCommerceApi {
  async fn fetch_products(
    &self,
    req: PageRequest,
  ) -> Result<Page<RawProduct>, FetchError> {
    self.get_page("products", "products", req).await
  }
}

// ─── Header parsing ──────────────────────────────────────────────────────────

/// Pull the `rel="next"` target out of a `Link` header, if present.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
  let raw = headers.get(reqwest::header::LINK)?.to_str().ok()?;
  for part in raw.split(',') {
    let Some((target, params)) = part.trim().split_once(';') else {
      continue;
    };
    if params.contains("rel=\"next\"") {
      let target = target.trim().trim_start_matches('<').trim_end_matches('>');
      return Some(target.to_owned());
    }
  }
  None
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
  headers
    .get(reqwest::header::RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse::<f64>()
    .ok()
    .filter(|s| s.is_finite() && *s >= 0.0)
    .map(Duration::from_secs_f64)
}
