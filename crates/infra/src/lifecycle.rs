//! Order lifecycle → stock reconciliation.
//!
//! - Order created: every line is taken out of stock (`ORDER_CREATE`)
//! - Order enters `CANCELLED`: every line goes back (`ORDER_CANCEL`)
//! - Order leaves `CANCELLED`: every line is taken out again (`ORDER_RESTORE`)
//!
//! Each effect is committed together with the order write that causes it
//! (the insert, or the status compare-and-swap), so an order's status and its
//! stock never disagree: a failed commit leaves both untouched.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tracing::instrument;

use stockledger_core::{OrderId, UserId};
use stockledger_inventory::{MovementContext, MovementType, StockMovement};
use stockledger_orders::{NewOrder, Order, OrderStatus};

use crate::engine::{Plan, ReconcileError, ReconciliationEngine, batch_requests};
use crate::store::{OrderStore, OrderWrite, StockStore};

/// Translates order events into engine commits.
#[derive(Debug)]
pub struct OrderLifecycleAdapter<S> {
    engine: Arc<ReconciliationEngine<S>>,
}

impl<S> Clone for OrderLifecycleAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

fn order_context(order_id: OrderId, actor: Option<UserId>) -> MovementContext {
    MovementContext {
        created_by_id: actor,
        ..MovementContext::for_order(order_id)
    }
}

impl<S> OrderLifecycleAdapter<S>
where
    S: StockStore + OrderStore,
{
    pub fn new(engine: Arc<ReconciliationEngine<S>>) -> Self {
        Self { engine }
    }

    /// Take every line of `order` out of stock and insert the order in the
    /// same commit.
    pub async fn on_created(
        &self,
        order: &Order,
        actor: Option<UserId>,
    ) -> Result<Vec<StockMovement>, ReconcileError> {
        let movement_type = MovementType::OrderCreate;
        let requests = batch_requests(order.stock_changes(movement_type))?;
        let ctx = order_context(order.id, actor);
        let (requests, ctx, engine) = (requests.as_slice(), &ctx, &self.engine);

        engine
            .retrying(format!("order {}", order.id), || async move {
                let plan = engine.plan(requests, movement_type, ctx).await?;
                engine.commit(plan, Some(OrderWrite::Insert(order.clone()))).await
            })
            .await
    }

    /// Move order `id` to `to`, committing the status write and its stock
    /// effect together.
    ///
    /// Every attempt re-reads the order, so the effect is always planned from
    /// the status the write is conditioned on.
    pub async fn on_status_change(
        &self,
        id: OrderId,
        to: OrderStatus,
        actor: Option<UserId>,
    ) -> Result<OrderOutcome, ReconcileError> {
        self.engine
            .retrying(format!("order {id}"), move || self.try_status_change(id, to, actor))
            .await
    }

    async fn try_status_change(
        &self,
        id: OrderId,
        to: OrderStatus,
        actor: Option<UserId>,
    ) -> Result<OrderOutcome, ReconcileError> {
        let order = self
            .engine
            .store()
            .get_order(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("order {id}")))?;

        let plan = match order.transition(to).movement_type() {
            Some(movement_type) => {
                let requests = batch_requests(order.stock_changes(movement_type))?;
                self.engine
                    .plan(&requests, movement_type, &order_context(id, actor))
                    .await?
            }
            None => Plan::default(),
        };

        let at = Utc::now().trunc_subsecs(6);
        let write = OrderWrite::Transition {
            order_id: id,
            from: order.status,
            to,
            at,
        };
        let movements = self.engine.commit(plan, Some(write)).await?;
        Ok(OrderOutcome {
            order: Order {
                status: to,
                updated_at: at,
                ..order
            },
            movements,
        })
    }
}

/// Order plus the ledger entries its latest operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcome {
    #[serde(flatten)]
    pub order: Order,
    pub movements: Vec<StockMovement>,
}

/// Orders backed by an `OrderStore`, with stock kept in step.
#[derive(Debug)]
pub struct OrderService<O, S> {
    orders: O,
    adapter: OrderLifecycleAdapter<S>,
}

impl<O, S> OrderService<O, S>
where
    O: OrderStore,
    S: StockStore + OrderStore,
{
    pub fn new(orders: O, adapter: OrderLifecycleAdapter<S>) -> Self {
        Self { orders, adapter }
    }

    #[instrument(skip(self, new), fields(items = new.items.len()), err)]
    pub async fn create_order(
        &self,
        new: NewOrder,
        actor: Option<UserId>,
    ) -> Result<OrderOutcome, ReconcileError> {
        let order = new.into_order(OrderId::new(), Utc::now().trunc_subsecs(6))?;
        let movements = self.adapter.on_created(&order, actor).await?;
        tracing::info!(order_id = %order.id, entries = movements.len(), "order created");
        Ok(OrderOutcome { order, movements })
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order, ReconcileError> {
        self.orders
            .get_order(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("order {id}")))
    }

    #[instrument(skip(self), fields(order_id = %id, to = %to), err)]
    pub async fn change_status(
        &self,
        id: OrderId,
        to: OrderStatus,
        actor: Option<UserId>,
    ) -> Result<OrderOutcome, ReconcileError> {
        let outcome = self.adapter.on_status_change(id, to, actor).await?;
        tracing::info!(order_id = %id, status = %to, entries = outcome.movements.len(), "order status changed");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use stockledger_core::ProductId;
    use stockledger_inventory::{NewProduct, StockSnapshot};
    use stockledger_orders::OrderItem;

    use crate::engine::RetryPolicy;
    use crate::store::{
        CatalogStore, InMemoryStore, LedgerStore, MovementFilter, Page, PlannedEntry, StoreError,
    };

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: OrderService<Arc<InMemoryStore>, Arc<InMemoryStore>>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let engine = Arc::new(ReconciliationEngine::new(store.clone(), RetryPolicy::default()));
            let service = OrderService::new(store.clone(), OrderLifecycleAdapter::new(engine));
            Self { store, service }
        }

        async fn product(&self, stock: i64) -> ProductId {
            let p = NewProduct {
                sku: None,
                name: "Widget".into(),
                price: 0,
                stock,
                active: true,
            }
            .into_product(ProductId::new())
            .unwrap();
            let id = p.id;
            self.store.insert_product(p).await.unwrap();
            id
        }

        async fn stock(&self, id: ProductId) -> i64 {
            self.store.snapshots(&[id]).await.unwrap()[0].stock
        }

        async fn entries(&self) -> u64 {
            self.store
                .query(&MovementFilter::default(), Page::default())
                .await
                .unwrap()
                .pagination
                .total
        }
    }

    fn items(lines: &[(ProductId, i64)]) -> NewOrder {
        NewOrder {
            items: lines
                .iter()
                .map(|&(product_id, quantity)| OrderItem { product_id, quantity })
                .collect(),
        }
    }

    #[tokio::test]
    async fn create_then_cancel_restores_stock_with_two_entries() {
        let f = Fixture::new();
        let p = f.product(10).await;

        let created = f.service.create_order(items(&[(p, 3)]), None).await.unwrap();
        assert_eq!(f.stock(p).await, 7);
        assert_eq!(created.order.status, OrderStatus::Pending);

        let cancelled = f
            .service
            .change_status(created.order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.movements[0].movement_type, MovementType::OrderCancel);
        assert_eq!(f.stock(p).await, 10);
        assert_eq!(f.entries().await, 2);
    }

    #[tokio::test]
    async fn recancel_adds_nothing() {
        let f = Fixture::new();
        let p = f.product(10).await;
        let id = f.service.create_order(items(&[(p, 3)]), None).await.unwrap().order.id;

        f.service.change_status(id, OrderStatus::Cancelled, None).await.unwrap();
        f.service.change_status(id, OrderStatus::Cancelled, None).await.unwrap();

        assert_eq!(f.entries().await, 2);
        assert_eq!(f.stock(p).await, 10);
    }

    #[tokio::test]
    async fn failed_creation_leaves_no_order_and_no_stock_change() {
        let f = Fixture::new();
        let a = f.product(10).await;
        let b = f.product(1).await;

        let err = f
            .service
            .create_order(items(&[(a, 2), (b, 5)]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InsufficientStock { .. }));
        assert_eq!((f.stock(a).await, f.stock(b).await), (10, 1));
        assert_eq!(f.entries().await, 0);
    }

    #[tokio::test]
    async fn reactivation_reserves_again_and_is_blocked_when_short() {
        let f = Fixture::new();
        let p = f.product(5).await;
        let id = f.service.create_order(items(&[(p, 4)]), None).await.unwrap().order.id;
        f.service.change_status(id, OrderStatus::Cancelled, None).await.unwrap();

        // Someone else takes most of the stock while the order is cancelled.
        f.service.create_order(items(&[(p, 3)]), None).await.unwrap();

        let err = f
            .service
            .change_status(id, OrderStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InsufficientStock { .. }));
        assert_eq!(f.service.get_order(id).await.unwrap().status, OrderStatus::Cancelled);

        let restock = ReconciliationEngine::new(f.store.clone(), RetryPolicy::default());
        restock
            .reconcile(p, 10, MovementType::ManualAdjust, MovementContext::default())
            .await
            .unwrap();

        let restored = f
            .service
            .change_status(id, OrderStatus::Paid, None)
            .await
            .unwrap();
        assert_eq!(restored.movements[0].movement_type, MovementType::OrderRestore);
        assert_eq!(f.stock(p).await, 8);
    }

    #[tokio::test]
    async fn active_transitions_do_not_touch_stock() {
        let f = Fixture::new();
        let p = f.product(5).await;
        let id = f.service.create_order(items(&[(p, 1)]), None).await.unwrap().order.id;

        let paid = f.service.change_status(id, OrderStatus::Paid, None).await.unwrap();
        assert!(paid.movements.is_empty());
        assert_eq!(f.stock(p).await, 4);
    }

    #[tokio::test]
    async fn invalid_and_unknown_orders() {
        let f = Fixture::new();
        let p = f.product(5).await;

        let err = f.service.create_order(items(&[]), None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        let err = f.service.create_order(items(&[(p, 0)]), None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));

        let err = f
            .service
            .change_status(OrderId::new(), OrderStatus::Paid, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound(_)));
    }

    fn service_over<S: StockStore + OrderStore>(
        orders: Arc<InMemoryStore>,
        stock: S,
    ) -> OrderService<Arc<InMemoryStore>, S> {
        let engine = Arc::new(ReconciliationEngine::new(stock, RetryPolicy::default()));
        OrderService::new(orders, OrderLifecycleAdapter::new(engine))
    }

    /// Wraps the in-memory store and interferes with commits that carry an
    /// order write: either failing them outright, or cancelling the order
    /// through another writer first.
    struct Interfering {
        inner: Arc<InMemoryStore>,
        fail_order_writes: AtomicBool,
        cancel_first: AtomicBool,
    }

    impl Interfering {
        fn new(inner: Arc<InMemoryStore>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                fail_order_writes: AtomicBool::new(false),
                cancel_first: AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl StockStore for Interfering {
        async fn snapshots(&self, ids: &[ProductId]) -> Result<Vec<StockSnapshot>, StoreError> {
            self.inner.snapshots(ids).await
        }

        async fn last_order_movement(
            &self,
            order_id: OrderId,
            product_id: ProductId,
        ) -> Result<Option<StockMovement>, StoreError> {
            self.inner.last_order_movement(order_id, product_id).await
        }

        async fn commit(
            &self,
            entries: Vec<PlannedEntry>,
            order: Option<OrderWrite>,
        ) -> Result<Vec<StockMovement>, StoreError> {
            if let Some(OrderWrite::Transition { order_id, .. }) = &order {
                if self.fail_order_writes.load(Ordering::SeqCst) {
                    return Err(StoreError::Backend("connection reset".into()));
                }
                if self.cancel_first.swap(false, Ordering::SeqCst) {
                    service_over(self.inner.clone(), self.inner.clone())
                        .change_status(*order_id, OrderStatus::Cancelled, None)
                        .await
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                }
            }
            self.inner.commit(entries, order).await
        }
    }

    #[async_trait::async_trait]
    impl OrderStore for Interfering {
        async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.get_order(id).await
        }
    }

    #[tokio::test]
    async fn failed_status_commit_keeps_status_and_stock_in_step() {
        let f = Fixture::new();
        let p = f.product(10).await;
        let id = f.service.create_order(items(&[(p, 3)]), None).await.unwrap().order.id;

        let store = Interfering::new(f.store.clone());
        store.fail_order_writes.store(true, Ordering::SeqCst);
        let service = service_over(f.store.clone(), store.clone());

        let err = service
            .change_status(id, OrderStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Store(StoreError::Backend(_))));
        assert_eq!(service.get_order(id).await.unwrap().status, OrderStatus::Pending);
        assert_eq!(f.stock(p).await, 7);
        assert_eq!(f.entries().await, 1);

        // The order never left PENDING, so shipping keeps the stock reserved.
        store.fail_order_writes.store(false, Ordering::SeqCst);
        let shipped = service.change_status(id, OrderStatus::Shipped, None).await.unwrap();
        assert!(shipped.movements.is_empty());
        assert_eq!(shipped.order.status, OrderStatus::Shipped);
        assert_eq!(f.stock(p).await, 7);
        assert_eq!(f.entries().await, 1);
    }

    #[tokio::test]
    async fn cancel_racing_another_cancel_releases_stock_once() {
        let f = Fixture::new();
        let p = f.product(10).await;
        let id = f.service.create_order(items(&[(p, 3)]), None).await.unwrap().order.id;

        let store = Interfering::new(f.store.clone());
        store.cancel_first.store(true, Ordering::SeqCst);
        let service = service_over(f.store.clone(), store);

        let out = service
            .change_status(id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(out.order.status, OrderStatus::Cancelled);
        assert_eq!(out.movements.len(), 1);
        assert_eq!(f.stock(p).await, 10);
        assert_eq!(f.entries().await, 2);
    }

    #[tokio::test]
    async fn status_written_by_the_outcome_matches_the_store() {
        let f = Fixture::new();
        let p = f.product(5).await;
        let id = f.service.create_order(items(&[(p, 1)]), None).await.unwrap().order.id;

        let paid = f.service.change_status(id, OrderStatus::Paid, None).await.unwrap();
        assert_eq!(f.service.get_order(id).await.unwrap(), paid.order);
    }
}
