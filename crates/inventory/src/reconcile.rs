//! Pure reconciliation planning.
//!
//! Given the stock value read at some row version, these functions decide what
//! the ledger entry for a requested change looks like, or why the change must
//! be refused. Persisting the plan (and re-checking the version it was made
//! against) is the store's job.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, MovementId, ProductId};

use crate::movement::{MovementContext, MovementType, StockMovement};
use crate::product::StockSnapshot;

/// A signed delta for one product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub product_id: ProductId,
    pub delta: i64,
}

impl StockChange {
    pub fn new(product_id: ProductId, delta: i64) -> Self {
        Self { product_id, delta }
    }
}

/// What a reconciliation should do to the current stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockTarget {
    /// Apply a signed delta.
    By(i64),
    /// Set an absolute value; the delta is derived from the stock read.
    To(i64),
}

/// Outcome of the order idempotency check for one (order, product) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Apply,
    /// The pair is already in the state the change would put it in.
    AlreadyApplied(StockMovement),
    /// Release or re-reserve for a pair that never reserved anything; there
    /// is no stock to move.
    Untracked,
}

/// Merge duplicate product lines and order the result by product id.
///
/// Zero-sum lines survive the merge; callers decide whether that is valid for
/// the movement type.
pub fn merge_changes(changes: impl IntoIterator<Item = StockChange>) -> Result<Vec<StockChange>, DomainError> {
    let mut merged: BTreeMap<ProductId, i64> = BTreeMap::new();
    for change in changes {
        let slot = merged.entry(change.product_id).or_insert(0);
        *slot = slot
            .checked_add(change.delta)
            .ok_or_else(|| DomainError::validation("quantity overflow while merging lines"))?;
    }
    Ok(merged
        .into_iter()
        .map(|(product_id, delta)| StockChange { product_id, delta })
        .collect())
}

/// Enforce the sign convention of order-driven movements.
pub fn check_delta_sign(movement_type: MovementType, delta: i64) -> Result<(), DomainError> {
    match movement_type {
        MovementType::ManualAdjust => Ok(()),
        MovementType::OrderCreate | MovementType::OrderRestore if delta >= 0 => Err(
            DomainError::validation(format!("{movement_type} requires a negative quantity, got {delta}")),
        ),
        MovementType::OrderCancel if delta <= 0 => Err(DomainError::validation(format!(
            "{movement_type} requires a positive quantity, got {delta}"
        ))),
        _ => Ok(()),
    }
}

/// Build the ledger entry for `target` applied to `snapshot`.
pub fn plan_movement(
    snapshot: &StockSnapshot,
    target: StockTarget,
    movement_type: MovementType,
    ctx: &MovementContext,
    id: MovementId,
    now: DateTime<Utc>,
) -> Result<StockMovement, DomainError> {
    if movement_type.is_order_driven() && ctx.order_id.is_none() {
        return Err(DomainError::validation(format!(
            "{movement_type} requires an order reference"
        )));
    }
    if !movement_type.is_order_driven() && ctx.order_id.is_some() {
        return Err(DomainError::validation(
            "manual adjustments cannot reference an order",
        ));
    }

    let previous_stock = snapshot.stock;
    let delta = match target {
        StockTarget::By(delta) => delta,
        StockTarget::To(value) => {
            if value < 0 {
                return Err(DomainError::validation(format!(
                    "target stock must be non-negative, got {value}"
                )));
            }
            value
                .checked_sub(previous_stock)
                .ok_or_else(|| DomainError::validation("stock arithmetic overflow"))?
        }
    };
    check_delta_sign(movement_type, delta)?;

    let new_stock = previous_stock
        .checked_add(delta)
        .ok_or_else(|| DomainError::validation("stock arithmetic overflow"))?;
    if new_stock < 0 {
        return Err(DomainError::insufficient_stock(
            snapshot.product_id,
            previous_stock,
            delta.saturating_neg(),
        ));
    }

    let movement = StockMovement {
        id,
        product_id: snapshot.product_id,
        movement_type,
        quantity: delta,
        previous_stock,
        new_stock,
        reason: ctx.reason.clone(),
        created_by_id: ctx.created_by_id,
        order_id: ctx.order_id,
        created_at: now,
    };
    movement.validate()?;
    Ok(movement)
}

/// Decide whether an order-driven change still needs to be applied, given the
/// latest order-linked entry for the same (order, product) pair.
///
/// Create and restore leave the pair "active"; cancel leaves it "cancelled".
/// Requesting the state the pair is already in is a no-op that hands back the
/// entry that put it there. Only a create may start a pair's history.
pub fn order_guard(movement_type: MovementType, last: Option<&StockMovement>) -> GuardDecision {
    let Some(last) = last else {
        return match movement_type {
            MovementType::OrderCancel | MovementType::OrderRestore => GuardDecision::Untracked,
            MovementType::OrderCreate | MovementType::ManualAdjust => GuardDecision::Apply,
        };
    };
    let active = |t: MovementType| matches!(t, MovementType::OrderCreate | MovementType::OrderRestore);
    let already = match movement_type {
        MovementType::ManualAdjust => false,
        MovementType::OrderCancel => last.movement_type == MovementType::OrderCancel,
        MovementType::OrderCreate | MovementType::OrderRestore => active(last.movement_type),
    };
    if already {
        GuardDecision::AlreadyApplied(last.clone())
    } else {
        GuardDecision::Apply
    }
}
