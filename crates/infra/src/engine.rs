//! Stock reconciliation engine.
//!
//! The engine is the only writer of product stock. Every change runs the same
//! optimistic cycle:
//!
//! ```text
//! read snapshots (stock + row version)
//!   ↓
//! order guard (order-driven types only)
//!   ↓
//! plan ledger entries (pure, `stockledger_inventory::plan_movement`)
//!   ↓
//! commit: version CAS + stock write + ledger append (+ order write),
//!         all or nothing
//!   ↓ conflict / lock timeout
//! back off, re-read, re-plan (bounded)
//! ```
//!
//! Absolute targets are re-planned from the fresh read on every attempt, so a
//! retry never applies a delta computed against stale stock.

use std::future::Future;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use thiserror::Error;
use tracing::{Instrument, instrument};

use stockledger_core::{DomainError, ExpectedVersion, MovementId, ProductId};
use stockledger_inventory::{
    GuardDecision, MovementContext, MovementType, StockChange, StockMovement, StockTarget,
    merge_changes, order_guard, plan_movement,
};

use crate::store::{OrderGuard, OrderWrite, PlannedEntry, StockStore, StoreError};

/// Bounded retry for commit conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Public error of every stock-writing path.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// Commit kept conflicting; `subject` names the contended row.
    #[error("concurrent modification of {subject} after {attempts} attempts")]
    ConcurrentModification { subject: String, attempts: u32 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Store(e) if e.is_retryable())
    }
}

impl From<DomainError> for ReconcileError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ReconcileError::Validation(msg),
            DomainError::InsufficientStock {
                product_id,
                available,
                requested,
            } => ReconcileError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            DomainError::NotFound(msg) => ReconcileError::NotFound(msg),
            DomainError::Conflict(msg) => ReconcileError::Store(StoreError::Conflict(msg)),
            DomainError::InvariantViolation(msg) => ReconcileError::Store(StoreError::Invalid(msg)),
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => ReconcileError::NotFound(msg),
            other => ReconcileError::Store(other),
        }
    }
}

/// Merge an order-style batch into per-product delta requests.
pub(crate) fn batch_requests(changes: Vec<StockChange>) -> Result<Vec<(ProductId, StockTarget)>, ReconcileError> {
    let merged = merge_changes(changes)?;
    if merged.is_empty() {
        return Err(ReconcileError::Validation("no stock changes to apply".into()));
    }
    Ok(merged
        .iter()
        .map(|c| (c.product_id, StockTarget::By(c.delta)))
        .collect())
}

/// Entries ready to commit, plus the order-driven changes the guard found
/// already in place.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    entries: Vec<PlannedEntry>,
    already_applied: Vec<StockMovement>,
}

/// Applies stock changes through a `StockStore`.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S> ReconciliationEngine<S>
where
    S: StockStore,
{
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply a signed delta to one product.
    #[instrument(skip(self, ctx), fields(product_id = %product_id, movement_type = %movement_type), err)]
    pub async fn reconcile(
        &self,
        product_id: ProductId,
        delta: i64,
        movement_type: MovementType,
        ctx: MovementContext,
    ) -> Result<StockMovement, ReconcileError> {
        let mut out = self
            .run(&[(product_id, StockTarget::By(delta))], movement_type, &ctx)
            .await?;
        out.pop()
            .ok_or_else(|| ReconcileError::Store(StoreError::Backend("commit returned no entry".into())))
    }

    /// Set one product's stock to an absolute value (manual adjustment).
    #[instrument(skip(self, ctx), fields(product_id = %product_id, movement_type = %MovementType::ManualAdjust), err)]
    pub async fn reconcile_to(
        &self,
        product_id: ProductId,
        target: i64,
        ctx: MovementContext,
    ) -> Result<StockMovement, ReconcileError> {
        let mut out = self
            .run(&[(product_id, StockTarget::To(target))], MovementType::ManualAdjust, &ctx)
            .await?;
        out.pop()
            .ok_or_else(|| ReconcileError::Store(StoreError::Backend("commit returned no entry".into())))
    }

    /// Apply one change per product for a single cause, atomically.
    ///
    /// Duplicate product lines are merged first; the result is ordered by
    /// product id.
    #[instrument(skip(self, changes, ctx), fields(movement_type = %movement_type, order_id = ?ctx.order_id), err)]
    pub async fn reconcile_batch(
        &self,
        changes: Vec<StockChange>,
        movement_type: MovementType,
        ctx: MovementContext,
    ) -> Result<Vec<StockMovement>, ReconcileError> {
        let requests = batch_requests(changes)?;
        self.run(&requests, movement_type, &ctx).await
    }

    async fn run(
        &self,
        requests: &[(ProductId, StockTarget)],
        movement_type: MovementType,
        ctx: &MovementContext,
    ) -> Result<Vec<StockMovement>, ReconcileError> {
        let Some(&(first_product, _)) = requests.first() else {
            return Ok(vec![]);
        };
        self.retrying(format!("product {first_product}"), || async move {
            let plan = self.plan(requests, movement_type, ctx).await?;
            self.commit(plan, None).await
        })
        .await
    }

    /// Run `attempt` until it succeeds, fails for good, or the retry policy
    /// runs out. Each attempt must re-read whatever it plans against.
    pub(crate) async fn retrying<T, F, Fut>(&self, subject: String, mut attempt: F) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReconcileError>>,
    {
        let mut n = 0;
        loop {
            n += 1;
            let span = tracing::debug_span!("reconcile_attempt", attempt = n);
            match attempt().instrument(span).await {
                Ok(done) => return Ok(done),
                Err(e) if e.is_retryable() && n < self.retry.max_attempts => {
                    tracing::warn!(attempt = n, error = %e, "stock commit conflicted, retrying");
                    tokio::time::sleep(self.retry.delay(n)).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ReconcileError::ConcurrentModification { subject, attempts: n });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read fresh snapshots, run the order guard and plan one entry per
    /// request.
    pub(crate) async fn plan(
        &self,
        requests: &[(ProductId, StockTarget)],
        movement_type: MovementType,
        ctx: &MovementContext,
    ) -> Result<Plan, ReconcileError> {
        let ids: Vec<ProductId> = requests.iter().map(|r| r.0).collect();
        let snapshots = self.store.snapshots(&ids).await?;
        // Postgres keeps microseconds; truncate so both stores agree on ordering.
        let now = Utc::now().trunc_subsecs(6);

        let mut plan = Plan {
            entries: Vec::with_capacity(requests.len()),
            already_applied: Vec::new(),
        };

        for ((product_id, target), snapshot) in requests.iter().zip(&snapshots) {
            let mut guard = None;
            if let Some(order_id) = ctx.order_id.filter(|_| movement_type.is_order_driven()) {
                let last = self.store.last_order_movement(order_id, *product_id).await?;
                match order_guard(movement_type, last.as_ref()) {
                    GuardDecision::AlreadyApplied(existing) => {
                        tracing::info!(
                            product_id = %product_id,
                            order_id = %order_id,
                            "order stock effect already applied; skipping"
                        );
                        plan.already_applied.push(existing);
                        continue;
                    }
                    GuardDecision::Untracked => {
                        tracing::warn!(
                            product_id = %product_id,
                            order_id = %order_id,
                            movement_type = %movement_type,
                            "order never reserved stock for this product; nothing to move"
                        );
                        continue;
                    }
                    GuardDecision::Apply => {
                        guard = Some(OrderGuard {
                            order_id,
                            product_id: *product_id,
                            last_seen: last.map(|m| m.id),
                        });
                    }
                }
            }

            let movement = plan_movement(snapshot, *target, movement_type, ctx, MovementId::new(), now)?;
            plan.entries.push(PlannedEntry {
                expected_version: ExpectedVersion::Exact(snapshot.version),
                movement,
                guard,
            });
        }
        Ok(plan)
    }

    /// Commit `plan`, with `order` in the same transaction. Returns committed
    /// and already-applied entries ordered by product id.
    pub(crate) async fn commit(
        &self,
        plan: Plan,
        order: Option<OrderWrite>,
    ) -> Result<Vec<StockMovement>, ReconcileError> {
        let mut committed = self.store.commit(plan.entries, order).await?;
        committed.extend(plan.already_applied);
        committed.sort_by_key(|m| m.product_id);
        Ok(committed)
    }
}
