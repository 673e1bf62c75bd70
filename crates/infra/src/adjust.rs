//! Manual stock corrections (admin "set stock to N").

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::instrument;

use stockledger_core::{ProductId, UserId};
use stockledger_inventory::{MovementContext, StockMovement};

use crate::engine::{ReconcileError, ReconciliationEngine};
use crate::store::StockStore;

#[derive(Debug)]
pub struct ManualAdjustmentGateway<S> {
    engine: Arc<ReconciliationEngine<S>>,
}

impl<S> Clone for ManualAdjustmentGateway<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S> ManualAdjustmentGateway<S>
where
    S: StockStore,
{
    pub fn new(engine: Arc<ReconciliationEngine<S>>) -> Self {
        Self { engine }
    }

    /// Set a product's stock to `new_stock`.
    ///
    /// Setting the current value still records a zero-delta entry.
    #[instrument(skip(self, reason), fields(product_id = %product_id), err)]
    pub async fn adjust(
        &self,
        product_id: ProductId,
        new_stock: i64,
        reason: Option<String>,
        created_by: Option<UserId>,
    ) -> Result<StockMovement, ReconcileError> {
        if new_stock < 0 {
            return Err(ReconcileError::Validation(format!(
                "newStock must be a non-negative integer, got {new_stock}"
            )));
        }
        self.engine
            .reconcile_to(product_id, new_stock, MovementContext::manual(created_by, reason))
            .await
    }
}

/// Read a stock target from a JSON body value.
///
/// Integral floats (`12.0`) are accepted; fractions, strings and anything
/// else are a validation error.
pub fn parse_target(value: &JsonValue) -> Result<i64, ReconcileError> {
    let invalid = || ReconcileError::Validation(format!("newStock must be an integer, got {value}"));
    let JsonValue::Number(n) = value else {
        return Err(invalid());
    };
    if let Some(v) = n.as_i64() {
        return Ok(v);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        _ => Err(invalid()),
    }
}
