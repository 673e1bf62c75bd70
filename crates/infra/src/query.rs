//! Read side: ledger queries, per-product history and the catalog reads that
//! go with them. Nothing here writes.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use stockledger_core::{DomainError, ProductId, UserId};
use stockledger_inventory::{MovementType, Origin, Product};

use crate::store::{CatalogStore, DeltaSign, LedgerPage, LedgerStore, MovementFilter, Page, StoreError};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("export failed: {0}")]
    Export(String),
}

impl From<StoreError> for QueryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => QueryError::NotFound(msg),
            other => QueryError::Store(other),
        }
    }
}

impl From<DomainError> for QueryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(msg) => QueryError::NotFound(msg),
            other => QueryError::Validation(other.to_string()),
        }
    }
}

/// Raw query-string parameters shared by the list, count and export routes.
///
/// Empty strings are treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub product_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub origin: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub user_id: Option<String>,
    pub delta: Option<String>,
    pub empty_sku: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub date_format: Option<String>,
    pub date_tz: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl FilterParams {
    pub fn into_filter(&self) -> Result<MovementFilter, QueryError> {
        let from = present(&self.from).map(|s| parse_bound(s, false)).transpose()?;
        let to = present(&self.to).map(|s| parse_bound(s, true)).transpose()?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(QueryError::Validation(format!("from ({f}) is after to ({t})")));
            }
        }

        Ok(MovementFilter {
            product_id: present(&self.product_id)
                .map(str::parse::<ProductId>)
                .transpose()?,
            movement_type: present(&self.movement_type)
                .map(str::parse::<MovementType>)
                .transpose()?,
            origin: present(&self.origin).map(str::parse::<Origin>).transpose()?,
            from,
            to,
            user_id: present(&self.user_id).map(str::parse::<UserId>).transpose()?,
            delta: present(&self.delta).map(parse_delta).transpose()?,
            empty_sku: present(&self.empty_sku).map(parse_flag).transpose()?.unwrap_or(false),
        })
    }

    pub fn page(&self) -> Result<Page, QueryError> {
        let num = |name: &str, v: &Option<String>| {
            present(v)
                .map(|s| {
                    s.parse::<u32>()
                        .map_err(|_| QueryError::Validation(format!("{name} must be a positive integer, got '{s}'")))
                })
                .transpose()
        };
        Ok(Page::new(num("page", &self.page)?, num("limit", &self.limit)?))
    }
}

/// `YYYY-MM-DD` (UTC day; an upper bound covers the whole day) or RFC 3339.
fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, QueryError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| QueryError::Validation(format!("invalid date '{raw}' (expected YYYY-MM-DD or RFC 3339)")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| QueryError::Validation(format!("invalid date '{raw}'")))?;
    Ok(date.and_time(time).and_utc())
}

fn parse_delta(raw: &str) -> Result<DeltaSign, QueryError> {
    match raw.to_ascii_lowercase().as_str() {
        "positive" | "pos" | "+" => Ok(DeltaSign::Positive),
        "negative" | "neg" | "-" => Ok(DeltaSign::Negative),
        _ => Err(QueryError::Validation(format!(
            "delta must be 'positive' or 'negative', got '{raw}'"
        ))),
    }
}

fn parse_flag(raw: &str) -> Result<bool, QueryError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(QueryError::Validation(format!("expected a boolean, got '{raw}'"))),
    }
}

/// Ledger reads.
#[derive(Debug, Clone)]
pub struct MovementQueryService<L, C> {
    ledger: L,
    catalog: C,
}

impl<L, C> MovementQueryService<L, C>
where
    L: LedgerStore,
    C: CatalogStore,
{
    pub fn new(ledger: L, catalog: C) -> Self {
        Self { ledger, catalog }
    }

    #[instrument(skip(self, params), err)]
    pub async fn query(&self, params: &FilterParams) -> Result<LedgerPage, QueryError> {
        let filter = params.into_filter()?;
        Ok(self.ledger.query(&filter, params.page()?).await?)
    }

    #[instrument(skip(self, params), err)]
    pub async fn count_empty_sku(&self, params: &FilterParams) -> Result<u64, QueryError> {
        let filter = params.into_filter()?;
        Ok(self.ledger.count_empty_sku(&filter).await?)
    }

    /// Ledger of one product; the product must exist.
    #[instrument(skip(self, params), fields(product_id = %product_id), err)]
    pub async fn product_history(
        &self,
        product_id: ProductId,
        params: &FilterParams,
    ) -> Result<LedgerPage, QueryError> {
        if self.catalog.get_product(product_id).await?.is_none() {
            return Err(QueryError::NotFound(format!("product {product_id}")));
        }
        let filter = MovementFilter {
            product_id: Some(product_id),
            ..params.into_filter()?
        };
        Ok(self.ledger.query(&filter, params.page()?).await?)
    }
}

/// Product registration and reads.
#[derive(Debug, Clone)]
pub struct CatalogService<C> {
    catalog: C,
    low_stock_threshold: i64,
}

impl<C> CatalogService<C>
where
    C: CatalogStore,
{
    pub fn new(catalog: C, low_stock_threshold: i64) -> Self {
        Self {
            catalog,
            low_stock_threshold,
        }
    }

    /// Register a product row with its initial stock.
    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    pub async fn register(&self, product: Product) -> Result<Product, StoreError> {
        self.catalog.insert_product(product).await
    }

    pub async fn get(&self, id: ProductId) -> Result<Product, QueryError> {
        self.catalog
            .get_product(id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("product {id}")))
    }

    /// Active products at or below `threshold` (configured default if absent).
    pub async fn low_stock(&self, threshold: Option<i64>) -> Result<Vec<Product>, QueryError> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        if threshold < 0 {
            return Err(QueryError::Validation(format!(
                "threshold must be non-negative, got {threshold}"
            )));
        }
        Ok(self.catalog.low_stock(threshold).await?)
    }
}
