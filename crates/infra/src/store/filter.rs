//! Read-side filter, pagination and result shapes shared by every ledger store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{MovementId, ProductId, UserId};
use stockledger_inventory::{MovementType, Origin, Product, StockMovement};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Sign of a ledger entry's quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaSign {
    Positive,
    Negative,
}

impl DeltaSign {
    pub fn as_str(self) -> &'static str {
        match self {
            DeltaSign::Positive => "positive",
            DeltaSign::Negative => "negative",
        }
    }

    pub fn matches(self, quantity: i64) -> bool {
        match self {
            DeltaSign::Positive => quantity > 0,
            DeltaSign::Negative => quantity < 0,
        }
    }
}

/// Ledger query filter. Every field is optional and they combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementType>,
    pub origin: Option<Origin>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
    pub delta: Option<DeltaSign>,
    /// Only entries whose product has no SKU at query time.
    pub empty_sku: bool,
}

impl MovementFilter {
    /// In-process evaluation of the filter, used by the in-memory store.
    pub fn matches(&self, m: &StockMovement, product_has_sku: bool) -> bool {
        self.product_id.is_none_or(|id| m.product_id == id)
            && self.movement_type.is_none_or(|t| m.movement_type == t)
            && self.origin.is_none_or(|o| m.origin() == Some(o))
            && self.from.is_none_or(|from| m.created_at >= from)
            && self.to.is_none_or(|to| m.created_at <= to)
            && self.user_id.is_none_or(|u| m.created_by_id == Some(u))
            && self.delta.is_none_or(|d| d.matches(m.quantity))
            && (!self.empty_sku || !product_has_sku)
    }

    pub fn with_empty_sku(&self) -> Self {
        Self {
            empty_sku: true,
            ..self.clone()
        }
    }
}

/// Requested page (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Normalize raw values: page floors at 1, limit is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub total: u64,
}

impl Pagination {
    pub fn new(page: Page, total: u64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total_pages: total.div_ceil(u64::from(page.limit)),
            total,
        }
    }
}

/// Product columns carried alongside each ledger entry on reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub sku: Option<String>,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            sku: p.sku.clone(),
        }
    }
}

/// Ledger entry joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    #[serde(flatten)]
    pub movement: StockMovement,
    pub product: ProductSummary,
}

impl LedgerRecord {
    pub fn cursor(&self) -> Cursor {
        Cursor {
            created_at: self.movement.created_at,
            id: self.movement.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPage {
    pub data: Vec<LedgerRecord>,
    pub pagination: Pagination,
}

/// Keyset position in the newest-first ordering `(created_at DESC, id DESC)`.
///
/// A scan resumed from a cursor returns only entries strictly older than it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: MovementId,
}

impl Cursor {
    pub fn is_after(&self, m: &StockMovement) -> bool {
        (m.created_at, m.id) < (self.created_at, self.id)
    }
}
