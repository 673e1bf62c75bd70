//! Storage boundary for the stock ledger.
//!
//! Four narrow traits, each implemented by the in-memory store (tests/dev)
//! and the Postgres store (production):
//!
//! - `CatalogStore`: product rows as registered by the catalog
//! - `StockStore`: versioned stock reads and the atomic stock+ledger(+order) commit
//! - `LedgerStore`: filtered, paginated, keyset-scanned ledger reads
//! - `OrderStore`: order reads; order rows are only written through
//!   `StockStore::commit`, together with their stock effect

pub mod error;
pub mod filter;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use stockledger_core::{ExpectedVersion, MovementId, OrderId, ProductId};
use stockledger_inventory::{Product, StockMovement, StockSnapshot};
use stockledger_orders::{Order, OrderStatus};

pub use error::StoreError;
pub use filter::{
    Cursor, DeltaSign, LedgerPage, LedgerRecord, MovementFilter, Page, Pagination, ProductSummary,
};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Order idempotency precondition re-checked at commit time.
///
/// The commit fails with `StoreError::Conflict` unless the latest order-linked
/// entry for `(order_id, product_id)` is still `last_seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderGuard {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub last_seen: Option<MovementId>,
}

/// One planned stock write: the ledger entry plus the row version it was
/// planned against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub expected_version: ExpectedVersion,
    pub movement: StockMovement,
    pub guard: Option<OrderGuard>,
}

/// Order row write committed in the same transaction as the stock entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderWrite {
    /// New order with its lines; `Conflict` if the id is taken.
    Insert(Order),
    /// Status compare-and-swap: `Conflict` unless the stored status is still
    /// `from`, `NotFound` if the order is gone.
    Transition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    },
}

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Register a product row with its initial stock.
    async fn insert_product(&self, product: Product) -> Result<Product, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Active products with `stock <= threshold`, lowest stock first.
    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, StoreError>;
}

#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Read stock and row version for each product.
    ///
    /// Fails with `NotFound` if any product is unknown.
    async fn snapshots(&self, product_ids: &[ProductId]) -> Result<Vec<StockSnapshot>, StoreError>;

    /// Latest order-driven ledger entry for an (order, product) pair.
    async fn last_order_movement(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<Option<StockMovement>, StoreError>;

    /// Atomically apply every entry: for each, check the row version and order
    /// guard, write `stock = new_stock`, bump the version and append the
    /// ledger entry. `order` is written in the same transaction. Either
    /// everything commits or nothing does.
    async fn commit(
        &self,
        entries: Vec<PlannedEntry>,
        order: Option<OrderWrite>,
    ) -> Result<Vec<StockMovement>, StoreError>;
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Newest first (`created_at DESC, id DESC`).
    async fn query(&self, filter: &MovementFilter, page: Page) -> Result<LedgerPage, StoreError>;

    /// Number of entries matching `filter` whose product has no SKU.
    async fn count_empty_sku(&self, filter: &MovementFilter) -> Result<u64, StoreError>;

    /// Keyset scan in the same order as `query`, starting strictly after `after`.
    async fn scan(
        &self,
        filter: &MovementFilter,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<LedgerRecord>, StoreError>;
}

#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
}

/// Everything the ledger needs from one backend, usable as a trait object.
pub trait LedgerBackend: CatalogStore + StockStore + LedgerStore + OrderStore {}

impl<T> LedgerBackend for T where T: CatalogStore + StockStore + LedgerStore + OrderStore {}

#[async_trait::async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        (**self).insert_product(product).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        (**self).low_stock(threshold).await
    }
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn snapshots(&self, product_ids: &[ProductId]) -> Result<Vec<StockSnapshot>, StoreError> {
        (**self).snapshots(product_ids).await
    }

    async fn last_order_movement(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<Option<StockMovement>, StoreError> {
        (**self).last_order_movement(order_id, product_id).await
    }

    async fn commit(
        &self,
        entries: Vec<PlannedEntry>,
        order: Option<OrderWrite>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        (**self).commit(entries, order).await
    }
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn query(&self, filter: &MovementFilter, page: Page) -> Result<LedgerPage, StoreError> {
        (**self).query(filter, page).await
    }

    async fn count_empty_sku(&self, filter: &MovementFilter) -> Result<u64, StoreError> {
        (**self).count_empty_sku(filter).await
    }

    async fn scan(
        &self,
        filter: &MovementFilter,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        (**self).scan(filter, after, limit).await
    }
}

#[async_trait::async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get_order(id).await
    }
}
