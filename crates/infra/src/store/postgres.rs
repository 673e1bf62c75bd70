//! Postgres-backed stores.
//!
//! ## Concurrency
//!
//! A stock commit runs in one transaction. Each entry performs a conditional
//! `UPDATE products ... WHERE id = $id AND version = $expected AND stock = $prev`;
//! zero affected rows means another writer got there first and the commit is
//! rejected as a conflict. The UPDATE also row-locks the product, so the order
//! guard query that follows cannot race with another commit for the same
//! product. Entries are applied in product-id order to keep lock acquisition
//! consistent across concurrent batches.
//!
//! An order write rides in the same transaction and runs first: a status
//! change is `UPDATE orders ... WHERE status = $from`, so the order row lock
//! also serializes concurrent transitions of one order.
//!
//! ## Error Mapping
//!
//! | PostgreSQL code | Meaning | `StoreError` |
//! |---|---|---|
//! | `40001` | serialization failure | `Conflict` |
//! | `40P01` | deadlock detected | `Conflict` |
//! | `23505` | unique violation | `Conflict` |
//! | `55P03` | lock not available | `Timeout` |
//! | `57014` | statement timeout / cancel | `Timeout` |
//! | `23503` | foreign key violation | `NotFound` |
//! | `23xxx` (other) | constraint violation | `Invalid` |
//! | anything else | | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{ExpectedVersion, MovementId, OrderId, ProductId, UserId};
use stockledger_inventory::{Product, StockMovement, StockSnapshot};
use stockledger_orders::{Order, OrderItem, OrderStatus};

use super::filter::{Cursor, LedgerPage, LedgerRecord, MovementFilter, Page, Pagination, ProductSummary};
use super::{CatalogStore, LedgerStore, OrderStore, OrderWrite, PlannedEntry, StockStore, StoreError};

const MIGRATION: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Per-transaction lock wait bound; exceeding it surfaces as `Timeout` and
/// feeds the engine's retry loop.
const LOCK_TIMEOUT: &str = "SET LOCAL lock_timeout = '5s'";

const MOVEMENT_COLUMNS: &str = r#"
    m.id, m.product_id, m.type, m.quantity, m.previous_stock, m.new_stock,
    m.reason, m.created_by_id, m.order_id, m.created_at,
    p.name AS product_name, p.sku AS product_sku
"#;

/// Shared WHERE clause; parameters `$1..$9` are bound by `bind_filter`.
const FILTER_SQL: &str = r#"
    ($1::uuid IS NULL OR m.product_id = $1)
    AND ($2::text IS NULL OR m.type = $2)
    AND ($3::text IS NULL OR m.type = $3)
    AND ($4::bool IS NULL OR (m.order_id IS NOT NULL) = $4)
    AND ($5::timestamptz IS NULL OR m.created_at >= $5)
    AND ($6::timestamptz IS NULL OR m.created_at <= $6)
    AND ($7::uuid IS NULL OR m.created_by_id = $7)
    AND ($8::text IS NULL
         OR ($8 = 'positive' AND m.quantity > 0)
         OR ($8 = 'negative' AND m.quantity < 0))
    AND (NOT $9::bool OR p.sku IS NULL OR btrim(p.sku) = '')
"#;

/// Postgres implementation of every store trait.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and apply the embedded schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query(LOCK_TIMEOUT)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
        Ok(tx)
    }
}

/// Roll back and hand back `err` (rollback failures are logged, not raised).
async fn abort(tx: Transaction<'_, Postgres>, err: StoreError) -> StoreError {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
    err
}

async fn write_order(tx: &mut Transaction<'_, Postgres>, write: &OrderWrite) -> Result<(), StoreError> {
    match write {
        OrderWrite::Insert(order) => {
            sqlx::query("INSERT INTO orders (id, status, created_at, updated_at) VALUES ($1, $2, $3, $4)")
                .bind(*order.id.as_uuid())
                .bind(order.status.as_str())
                .bind(order.created_at)
                .bind(order.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("insert_order", e))?;

            for (line_no, item) in order.items.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO order_items (order_id, line_no, product_id, quantity) VALUES ($1, $2, $3, $4)",
                )
                .bind(*order.id.as_uuid())
                .bind(line_no as i32 + 1)
                .bind(*item.product_id.as_uuid())
                .bind(item.quantity)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("insert_order_item", e))?;
            }
            Ok(())
        }
        OrderWrite::Transition {
            order_id,
            from,
            to,
            at,
        } => {
            let updated = sqlx::query(
                "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
            )
            .bind(to.as_str())
            .bind(*at)
            .bind(*order_id.as_uuid())
            .bind(from.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_order_status", e))?;
            if updated.rows_affected() > 0 {
                return Ok(());
            }

            let current = sqlx::query_scalar::<_, String>("SELECT status FROM orders WHERE id = $1")
                .bind(*order_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("get_order_status", e))?;
            match current {
                None => Err(StoreError::NotFound(format!("order {order_id}"))),
                Some(status) => Err(StoreError::Conflict(format!(
                    "order {order_id} is {status} (expected {from})"
                ))),
            }
        }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, price, stock, active, version)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            "#,
        )
        .bind(*product.id.as_uuid())
        .bind(product.sku.as_deref())
        .bind(&product.name)
        .bind(i64::try_from(product.price).map_err(|_| StoreError::Invalid("price out of range".into()))?)
        .bind(product.stock)
        .bind(product.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        Ok(Product {
            version: 0,
            ..product
        })
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT id, sku, name, price, stock, active, version FROM products WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(|r| decode::<ProductRow>(&r).map(Product::from)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, sku, name, price, stock, active, version
            FROM products
            WHERE active AND stock <= $1
            ORDER BY stock ASC, name ASC
            "#,
        )
        .bind(threshold)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("low_stock", e))?;

        rows.iter()
            .map(|r| decode::<ProductRow>(r).map(Product::from))
            .collect()
    }
}

#[async_trait::async_trait]
impl StockStore for PostgresStore {
    #[instrument(skip(self, product_ids), fields(product_count = product_ids.len()), err)]
    async fn snapshots(&self, product_ids: &[ProductId]) -> Result<Vec<StockSnapshot>, StoreError> {
        let ids: Vec<Uuid> = product_ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id, stock, version FROM products WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("snapshots", e))?;

        let found: Vec<StockSnapshot> = rows
            .iter()
            .map(|r| -> Result<StockSnapshot, StoreError> {
                let id: Uuid = r.try_get("id").map_err(decode_error)?;
                let stock: i64 = r.try_get("stock").map_err(decode_error)?;
                let version: i64 = r.try_get("version").map_err(decode_error)?;
                Ok(StockSnapshot {
                    product_id: ProductId::from_uuid(id),
                    stock,
                    version: version as u64,
                })
            })
            .collect::<Result<_, _>>()?;

        product_ids
            .iter()
            .map(|id| {
                found
                    .iter()
                    .find(|s| s.product_id == *id)
                    .copied()
                    .ok_or_else(|| StoreError::NotFound(format!("product {id}")))
            })
            .collect()
    }

    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id), err)]
    async fn last_order_movement(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<Option<StockMovement>, StoreError> {
        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements m JOIN products p ON p.id = m.product_id
            WHERE m.order_id = $1 AND m.product_id = $2 AND m.type <> 'MANUAL_ADJUST'
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(*order_id.as_uuid())
            .bind(*product_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("last_order_movement", e))?;

        row.map(|r| decode::<MovementRow>(&r).and_then(StockMovement::try_from))
            .transpose()
    }

    #[instrument(skip(self, entries, order), fields(entry_count = entries.len(), order_write = order.is_some()), err)]
    async fn commit(
        &self,
        mut entries: Vec<PlannedEntry>,
        order: Option<OrderWrite>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        if entries.is_empty() && order.is_none() {
            return Ok(vec![]);
        }
        entries.sort_by_key(|e| e.movement.product_id);

        let mut tx = self.begin().await?;
        if let Some(write) = &order {
            if let Err(e) = write_order(&mut tx, write).await {
                return Err(abort(tx, e).await);
            }
        }
        let mut committed = Vec::with_capacity(entries.len());

        for entry in entries {
            let m = entry.movement;
            if let Err(e) = m.validate() {
                return Err(abort(tx, StoreError::Invalid(e.to_string())).await);
            }

            let expected = match entry.expected_version {
                ExpectedVersion::Any => None,
                ExpectedVersion::Exact(v) => Some(v as i64),
            };
            let updated = sqlx::query(
                r#"
                UPDATE products
                SET stock = $1, version = version + 1, updated_at = NOW()
                WHERE id = $2 AND stock = $3 AND ($4::bigint IS NULL OR version = $4)
                "#,
            )
            .bind(m.new_stock)
            .bind(*m.product_id.as_uuid())
            .bind(m.previous_stock)
            .bind(expected)
            .execute(&mut *tx)
            .await;
            let updated = match updated {
                Ok(r) => r,
                Err(e) => return Err(abort(tx, map_sqlx_error("update_stock", e)).await),
            };
            if updated.rows_affected() == 0 {
                let err = StoreError::Conflict(format!(
                    "product {} changed since it was read (expected {:?})",
                    m.product_id, entry.expected_version
                ));
                return Err(abort(tx, err).await);
            }

            if let Some(guard) = entry.guard {
                let last = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    SELECT id FROM stock_movements
                    WHERE order_id = $1 AND product_id = $2 AND type <> 'MANUAL_ADJUST'
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#,
                )
                .bind(*guard.order_id.as_uuid())
                .bind(*guard.product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await;
                let last = match last {
                    Ok(v) => v.map(MovementId::from_uuid),
                    Err(e) => return Err(abort(tx, map_sqlx_error("order_guard", e)).await),
                };
                if last != guard.last_seen {
                    let err = StoreError::Conflict(format!(
                        "order {} changed state for product {}",
                        guard.order_id, guard.product_id
                    ));
                    return Err(abort(tx, err).await);
                }
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    id, product_id, type, quantity, previous_stock, new_stock,
                    reason, created_by_id, order_id, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(*m.id.as_uuid())
            .bind(*m.product_id.as_uuid())
            .bind(m.movement_type.as_str())
            .bind(m.quantity)
            .bind(m.previous_stock)
            .bind(m.new_stock)
            .bind(m.reason.as_deref())
            .bind(m.created_by_id.map(Uuid::from))
            .bind(m.order_id.map(Uuid::from))
            .bind(m.created_at)
            .execute(&mut *tx)
            .await;
            if let Err(e) = inserted {
                return Err(abort(tx, map_sqlx_error("insert_movement", e)).await);
            }

            committed.push(m);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(committed)
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self, filter), fields(page = page.page, limit = page.limit), err)]
    async fn query(&self, filter: &MovementFilter, page: Page) -> Result<LedgerPage, StoreError> {
        let params = FilterParams::from(filter);

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM stock_movements m JOIN products p ON p.id = m.product_id WHERE {FILTER_SQL}"
        );
        let total: i64 = bind_filter(sqlx::query(&count_sql), &params)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?
            .try_get("total")
            .map_err(decode_error)?;

        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements m JOIN products p ON p.id = m.product_id
            WHERE {FILTER_SQL}
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $10 OFFSET $11
            "#
        );
        let rows = bind_filter(sqlx::query(&sql), &params)
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;

        let data = rows
            .iter()
            .map(|r| decode::<LedgerRow>(r).and_then(LedgerRecord::try_from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LedgerPage {
            data,
            pagination: Pagination::new(page, total as u64),
        })
    }

    #[instrument(skip(self, filter), err)]
    async fn count_empty_sku(&self, filter: &MovementFilter) -> Result<u64, StoreError> {
        let params = FilterParams::from(&filter.with_empty_sku());
        let sql = format!(
            "SELECT COUNT(*) AS total FROM stock_movements m JOIN products p ON p.id = m.product_id WHERE {FILTER_SQL}"
        );
        let total: i64 = bind_filter(sqlx::query(&sql), &params)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_empty_sku", e))?
            .try_get("total")
            .map_err(decode_error)?;
        Ok(total as u64)
    }

    #[instrument(skip(self, filter), fields(has_cursor = after.is_some(), limit), err)]
    async fn scan(
        &self,
        filter: &MovementFilter,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        let params = FilterParams::from(filter);
        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements m JOIN products p ON p.id = m.product_id
            WHERE {FILTER_SQL}
              AND ($10::timestamptz IS NULL OR (m.created_at, m.id) < ($10, $11::uuid))
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $12
            "#
        );
        let rows = bind_filter(sqlx::query(&sql), &params)
            .bind(after.map(|c| c.created_at))
            .bind(after.map(|c| Uuid::from(c.id)))
            .bind(i64::from(limit))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("scan_movements", e))?;

        rows.iter()
            .map(|r| decode::<LedgerRow>(r).and_then(LedgerRecord::try_from))
            .collect()
    }
}

#[async_trait::async_trait]
impl OrderStore for PostgresStore {
    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT id, status, created_at, updated_at FROM orders WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let header = decode::<OrderRow>(&row)?;

        let items = sqlx::query(
            "SELECT product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY line_no ASC",
        )
        .bind(*id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order_items", e))?
        .iter()
        .map(|r| -> Result<OrderItem, StoreError> {
            let product_id: Uuid = r.try_get("product_id").map_err(decode_error)?;
            Ok(OrderItem {
                product_id: ProductId::from_uuid(product_id),
                quantity: r.try_get("quantity").map_err(decode_error)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Order {
            id: OrderId::from_uuid(header.id),
            status: header
                .status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            items,
            created_at: header.created_at,
            updated_at: header.updated_at,
        }))
    }
}

/// Filter values converted to bindable column types.
struct FilterParams {
    product_id: Option<Uuid>,
    movement_type: Option<&'static str>,
    origin_type: Option<&'static str>,
    origin_has_order: Option<bool>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    user_id: Option<Uuid>,
    delta: Option<&'static str>,
    empty_sku: bool,
}

impl From<&MovementFilter> for FilterParams {
    fn from(f: &MovementFilter) -> Self {
        Self {
            product_id: f.product_id.map(Uuid::from),
            movement_type: f.movement_type.map(|t| t.as_str()),
            origin_type: f.origin.map(|o| o.movement_type().as_str()),
            origin_has_order: f.origin.map(|o| o.requires_order()),
            from: f.from,
            to: f.to,
            user_id: f.user_id.map(Uuid::from),
            delta: f.delta.map(|d| d.as_str()),
            empty_sku: f.empty_sku,
        }
    }
}

fn bind_filter<'q>(
    query: Query<'q, Postgres, PgArguments>,
    p: &FilterParams,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(p.product_id)
        .bind(p.movement_type)
        .bind(p.origin_type)
        .bind(p.origin_has_order)
        .bind(p.from)
        .bind(p.to)
        .bind(p.user_id)
        .bind(p.delta)
        .bind(p.empty_sku)
}

fn decode<T>(row: &PgRow) -> Result<T, StoreError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(decode_error)
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                Some("55P03") | Some("57014") => StoreError::Timeout(msg),
                Some("23503") => StoreError::NotFound(msg),
                Some(code) if code.starts_with("23") => StoreError::Invalid(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    sku: Option<String>,
    name: String,
    price: i64,
    stock: i64,
    active: bool,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            active: row.try_get("active")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::from_uuid(row.id),
            sku: row.sku,
            name: row.name,
            price: row.price.max(0) as u64,
            stock: row.stock,
            active: row.active,
            version: row.version as u64,
        }
    }
}

#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    movement_type: String,
    quantity: i64,
    previous_stock: i64,
    new_stock: i64,
    reason: Option<String>,
    created_by_id: Option<Uuid>,
    order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            movement_type: row.try_get("type")?,
            quantity: row.try_get("quantity")?,
            previous_stock: row.try_get("previous_stock")?,
            new_stock: row.try_get("new_stock")?,
            reason: row.try_get("reason")?,
            created_by_id: row.try_get("created_by_id")?,
            order_id: row.try_get("order_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: MovementId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            movement_type: row
                .movement_type
                .parse()
                .map_err(|e: stockledger_core::DomainError| StoreError::Backend(e.to_string()))?,
            quantity: row.quantity,
            previous_stock: row.previous_stock,
            new_stock: row.new_stock,
            reason: row.reason,
            created_by_id: row.created_by_id.map(UserId::from_uuid),
            order_id: row.order_id.map(OrderId::from_uuid),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct LedgerRow {
    movement: MovementRow,
    product_name: String,
    product_sku: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for LedgerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerRow {
            movement: MovementRow::from_row(row)?,
            product_name: row.try_get("product_name")?,
            product_sku: row.try_get("product_sku")?,
        })
    }
}

impl TryFrom<LedgerRow> for LedgerRecord {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let movement = StockMovement::try_from(row.movement)?;
        Ok(LedgerRecord {
            product: ProductSummary {
                id: movement.product_id,
                name: row.product_name,
                sku: row.product_sku,
            },
            movement,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
