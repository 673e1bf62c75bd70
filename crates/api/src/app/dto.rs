//! Request bodies and JSON mapping helpers.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use stockledger_core::ProductId;
use stockledger_infra::ReconcileError;
use stockledger_orders::{NewOrder, OrderItem};

/// `POST /products/:id/stock-adjust`.
///
/// `newStock` stays raw JSON so a fractional or string value is reported as
/// a validation error instead of a body rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    #[serde(default)]
    pub new_stock: JsonValue,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

impl CreateOrderRequest {
    pub fn into_new_order(self) -> Result<NewOrder, ReconcileError> {
        let items = self
            .items
            .into_iter()
            .map(|item| -> Result<OrderItem, ReconcileError> {
                let product_id: ProductId = item.product_id.parse()?;
                Ok(OrderItem {
                    product_id,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NewOrder { items })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<String>,
}

impl LowStockQuery {
    pub fn threshold(&self) -> Result<Option<i64>, ReconcileError> {
        match self.threshold.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ReconcileError::Validation(format!("threshold must be an integer, got '{raw}'"))),
        }
    }
}
