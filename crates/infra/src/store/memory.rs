use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use stockledger_core::{OrderId, ProductId};
use stockledger_inventory::{Product, StockMovement, StockSnapshot};
use stockledger_orders::Order;

use super::filter::{Cursor, LedgerPage, LedgerRecord, MovementFilter, Page, Pagination, ProductSummary};
use super::{CatalogStore, LedgerStore, OrderStore, OrderWrite, PlannedEntry, StockStore, StoreError};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    /// Append order.
    movements: Vec<StockMovement>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    fn last_order_movement(&self, order_id: OrderId, product_id: ProductId) -> Option<&StockMovement> {
        self.movements.iter().rev().find(|m| {
            m.movement_type.is_order_driven()
                && m.order_id == Some(order_id)
                && m.product_id == product_id
        })
    }

    fn has_sku(&self, product_id: ProductId) -> bool {
        self.products.get(&product_id).is_some_and(Product::has_sku)
    }

    /// Matching entries, newest first.
    fn matching(&self, filter: &MovementFilter) -> Vec<&StockMovement> {
        let mut out: Vec<&StockMovement> = self
            .movements
            .iter()
            .filter(|m| filter.matches(m, self.has_sku(m.product_id)))
            .collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    fn record(&self, m: &StockMovement) -> LedgerRecord {
        let product = match self.products.get(&m.product_id) {
            Some(p) => ProductSummary::from(p),
            None => ProductSummary {
                id: m.product_id,
                name: String::new(),
                sku: None,
            },
        };
        LedgerRecord {
            movement: m.clone(),
            product,
        }
    }

    fn check_order_write(&self, write: &OrderWrite) -> Result<(), StoreError> {
        match write {
            OrderWrite::Insert(order) if self.orders.contains_key(&order.id) => {
                Err(StoreError::Conflict(format!("order {} already exists", order.id)))
            }
            OrderWrite::Insert(_) => Ok(()),
            OrderWrite::Transition { order_id, from, .. } => {
                let current = self
                    .orders
                    .get(order_id)
                    .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
                if current.status != *from {
                    return Err(StoreError::Conflict(format!(
                        "order {order_id} is {} (expected {from})",
                        current.status
                    )));
                }
                Ok(())
            }
        }
    }

    fn apply_order_write(&mut self, write: OrderWrite) {
        match write {
            OrderWrite::Insert(order) => {
                self.orders.insert(order.id, order);
            }
            OrderWrite::Transition { order_id, to, at, .. } => {
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.status = to;
                    order.updated_at = at;
                }
            }
        }
    }

    fn commit(
        &mut self,
        entries: Vec<PlannedEntry>,
        order: Option<OrderWrite>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        // Verify everything first so a failure leaves no partial writes.
        if let Some(write) = &order {
            self.check_order_write(write)?;
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            let m = &entry.movement;
            if !seen.insert(m.product_id) {
                return Err(StoreError::Invalid(format!(
                    "product {} appears twice in one commit",
                    m.product_id
                )));
            }
            let product = self
                .products
                .get(&m.product_id)
                .ok_or_else(|| StoreError::NotFound(format!("product {}", m.product_id)))?;
            entry
                .expected_version
                .check(product.version)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
            if product.stock != m.previous_stock {
                return Err(StoreError::Conflict(format!(
                    "stock for product {} changed (read {}, now {})",
                    m.product_id, m.previous_stock, product.stock
                )));
            }
            m.validate().map_err(|e| StoreError::Invalid(e.to_string()))?;
            if let Some(guard) = entry.guard {
                let last = self
                    .last_order_movement(guard.order_id, guard.product_id)
                    .map(|m| m.id);
                if last != guard.last_seen {
                    return Err(StoreError::Conflict(format!(
                        "order {} changed state for product {}",
                        guard.order_id, guard.product_id
                    )));
                }
            }
        }

        let mut committed = Vec::with_capacity(entries.len());
        for entry in entries {
            let m = entry.movement;
            if let Some(product) = self.products.get_mut(&m.product_id) {
                product.stock = m.new_stock;
                product.version += 1;
            }
            self.movements.push(m.clone());
            committed.push(m);
        }
        if let Some(write) = order {
            self.apply_order_write(write);
        }
        Ok(committed)
    }
}

/// In-memory implementation of every store trait.
///
/// Intended for tests/dev. A single lock covers products, ledger and orders,
/// so a commit (order write included) is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(f(&state))
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(&mut state)
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        self.write(|s| {
            if s.products.contains_key(&product.id) {
                return Err(StoreError::Conflict(format!("product {} already exists", product.id)));
            }
            if let Some(sku) = product.sku.as_deref() {
                if s.products.values().any(|p| p.sku.as_deref() == Some(sku)) {
                    return Err(StoreError::Conflict(format!("sku '{sku}' already exists")));
                }
            }
            s.products.insert(product.id, product.clone());
            Ok(product)
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.read(|s| s.products.get(&id).cloned())
    }

    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        self.read(|s| {
            let mut out: Vec<Product> = s
                .products
                .values()
                .filter(|p| p.active && p.stock <= threshold)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
            out
        })
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStore {
    async fn snapshots(&self, product_ids: &[ProductId]) -> Result<Vec<StockSnapshot>, StoreError> {
        self.read(|s| {
            product_ids
                .iter()
                .map(|id| {
                    s.products
                        .get(id)
                        .map(Product::snapshot)
                        .ok_or_else(|| StoreError::NotFound(format!("product {id}")))
                })
                .collect::<Result<Vec<_>, _>>()
        })?
    }

    async fn last_order_movement(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<Option<StockMovement>, StoreError> {
        self.read(|s| s.last_order_movement(order_id, product_id).cloned())
    }

    async fn commit(
        &self,
        entries: Vec<PlannedEntry>,
        order: Option<OrderWrite>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        if entries.is_empty() && order.is_none() {
            return Ok(vec![]);
        }
        self.write(|s| s.commit(entries, order))
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryStore {
    async fn query(&self, filter: &MovementFilter, page: Page) -> Result<LedgerPage, StoreError> {
        self.read(|s| {
            let matching = s.matching(filter);
            let total = matching.len() as u64;
            let data = matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit as usize)
                .map(|m| s.record(m))
                .collect();
            LedgerPage {
                data,
                pagination: Pagination::new(page, total),
            }
        })
    }

    async fn count_empty_sku(&self, filter: &MovementFilter) -> Result<u64, StoreError> {
        let filter = filter.with_empty_sku();
        self.read(|s| s.matching(&filter).len() as u64)
    }

    async fn scan(
        &self,
        filter: &MovementFilter,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        self.read(|s| {
            s.matching(filter)
                .into_iter()
                .filter(|m| after.is_none_or(|c| c.is_after(m)))
                .take(limit as usize)
                .map(|m| s.record(m))
                .collect()
        })
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.read(|s| s.orders.get(&id).cloned())
    }
}
