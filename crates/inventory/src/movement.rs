use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, MovementId, OrderId, ProductId, UserId};

/// Cause of a stock mutation (closed set).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    ManualAdjust,
    OrderCreate,
    OrderCancel,
    OrderRestore,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::ManualAdjust,
        MovementType::OrderCreate,
        MovementType::OrderCancel,
        MovementType::OrderRestore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::ManualAdjust => "MANUAL_ADJUST",
            MovementType::OrderCreate => "ORDER_CREATE",
            MovementType::OrderCancel => "ORDER_CANCEL",
            MovementType::OrderRestore => "ORDER_RESTORE",
        }
    }

    /// Whether entries of this type are tied to an order.
    pub fn is_order_driven(self) -> bool {
        !matches!(self, MovementType::ManualAdjust)
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// Derived classification of a ledger entry used for filtering and display.
///
/// An order-driven origin requires both the matching type and an order
/// reference; a manual origin requires `MANUAL_ADJUST` without one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Manual,
    OrderCreate,
    OrderCancel,
    OrderRestore,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Manual => "manual",
            Origin::OrderCreate => "order_create",
            Origin::OrderCancel => "order_cancel",
            Origin::OrderRestore => "order_restore",
        }
    }

    /// Classify an entry; `None` for inconsistent combinations (e.g. an
    /// order-driven type with no order reference).
    pub fn classify(movement_type: MovementType, order_id: Option<OrderId>) -> Option<Origin> {
        match (movement_type, order_id) {
            (MovementType::ManualAdjust, None) => Some(Origin::Manual),
            (MovementType::OrderCreate, Some(_)) => Some(Origin::OrderCreate),
            (MovementType::OrderCancel, Some(_)) => Some(Origin::OrderCancel),
            (MovementType::OrderRestore, Some(_)) => Some(Origin::OrderRestore),
            _ => None,
        }
    }

    /// The movement type an origin is derived from.
    pub fn movement_type(self) -> MovementType {
        match self {
            Origin::Manual => MovementType::ManualAdjust,
            Origin::OrderCreate => MovementType::OrderCreate,
            Origin::OrderCancel => MovementType::OrderCancel,
            Origin::OrderRestore => MovementType::OrderRestore,
        }
    }

    /// Whether the origin requires an order reference.
    pub fn requires_order(self) -> bool {
        !matches!(self, Origin::Manual)
    }
}

impl FromStr for Origin {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Origin::Manual),
            "order_create" => Ok(Origin::OrderCreate),
            "order_cancel" => Ok(Origin::OrderCancel),
            "order_restore" => Ok(Origin::OrderRestore),
            _ => Err(DomainError::validation(format!(
                "unknown origin '{s}' (expected manual, order_create, order_cancel, order_restore)"
            ))),
        }
    }
}

/// Optional causal context attached to a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementContext {
    pub order_id: Option<OrderId>,
    pub created_by_id: Option<UserId>,
    pub reason: Option<String>,
}

impl MovementContext {
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    pub fn manual(created_by_id: Option<UserId>, reason: Option<String>) -> Self {
        Self {
            order_id: None,
            created_by_id,
            reason: reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        }
    }
}

/// Immutable ledger entry: one committed stock mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Signed delta applied to the product's stock.
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: Option<String>,
    pub created_by_id: Option<UserId>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Check the entry's own invariants before it is appended.
    pub fn validate(&self) -> Result<(), DomainError> {
        let expected = self.previous_stock.checked_add(self.quantity).ok_or_else(|| {
            DomainError::validation("stock arithmetic overflow")
        })?;
        if expected != self.new_stock {
            return Err(DomainError::validation(format!(
                "newStock ({}) must equal previousStock ({}) + quantity ({})",
                self.new_stock, self.previous_stock, self.quantity
            )));
        }
        if self.previous_stock < 0 || self.new_stock < 0 {
            return Err(DomainError::validation("stock values cannot be negative"));
        }
        if self.movement_type.is_order_driven() && self.order_id.is_none() {
            return Err(DomainError::validation(format!(
                "{} entries require an order reference",
                self.movement_type
            )));
        }
        if self.movement_type == MovementType::ManualAdjust && self.order_id.is_some() {
            return Err(DomainError::validation(
                "MANUAL_ADJUST entries cannot reference an order",
            ));
        }
        Ok(())
    }

    pub fn origin(&self) -> Option<Origin> {
        Origin::classify(self.movement_type, self.order_id)
    }

    /// Human-readable origin used by reports and exports.
    pub fn origin_label(&self) -> String {
        match (self.movement_type, self.order_id) {
            (MovementType::ManualAdjust, _) => "Manual adjustment".to_string(),
            (MovementType::OrderCreate, Some(id)) => format!("Order {id}"),
            (MovementType::OrderCreate, None) => "Order created".to_string(),
            (MovementType::OrderCancel, Some(id)) => format!("Order {id} cancelled"),
            (MovementType::OrderCancel, None) => "Order cancelled".to_string(),
            (MovementType::OrderRestore, Some(id)) => format!("Order {id} reactivated"),
            (MovementType::OrderRestore, None) => "Order reactivated".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(movement_type: MovementType, prev: i64, qty: i64, new: i64) -> StockMovement {
        StockMovement {
            id: MovementId::new(),
            product_id: ProductId::new(),
            movement_type,
            quantity: qty,
            previous_stock: prev,
            new_stock: new,
            reason: None,
            created_by_id: None,
            order_id: movement_type.is_order_driven().then(OrderId::new),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn type_parses_case_insensitively_and_rejects_unknown() {
        assert_eq!("order_cancel".parse::<MovementType>().unwrap(), MovementType::OrderCancel);
        assert_eq!("MANUAL_ADJUST".parse::<MovementType>().unwrap(), MovementType::ManualAdjust);
        assert!(matches!(
            "RESTOCK".parse::<MovementType>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn type_serializes_as_screaming_snake() {
        let json = serde_json::to_value(MovementType::OrderRestore).unwrap();
        assert_eq!(json, "ORDER_RESTORE");
    }

    #[test]
    fn inconsistent_entry_is_rejected() {
        let bad = entry(MovementType::OrderCreate, 10, -3, 6);
        assert!(matches!(bad.validate(), Err(DomainError::Validation(_))));

        let ok = entry(MovementType::OrderCreate, 10, -3, 7);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn negative_new_stock_is_rejected() {
        let bad = entry(MovementType::ManualAdjust, 2, -3, -1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn order_driven_entry_requires_order() {
        let mut e = entry(MovementType::OrderCancel, 7, 3, 10);
        e.order_id = None;
        assert!(e.validate().is_err());
        assert_eq!(e.origin(), None);
    }

    #[test]
    fn origin_is_derived_from_type_and_order() {
        let e = entry(MovementType::OrderRestore, 10, -3, 7);
        assert_eq!(e.origin(), Some(Origin::OrderRestore));
        assert!(e.origin_label().ends_with("reactivated"));

        let m = entry(MovementType::ManualAdjust, 10, 40, 50);
        assert_eq!(m.origin(), Some(Origin::Manual));
        assert_eq!(m.origin_label(), "Manual adjustment");
    }

    #[test]
    fn wire_shape_uses_camel_case_and_type_key() {
        let e = entry(MovementType::OrderCreate, 10, -3, 7);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "ORDER_CREATE");
        assert_eq!(json["previousStock"], 10);
        assert_eq!(json["newStock"], 7);
        assert!(json.get("orderId").is_some());
    }

    #[test]
    fn manual_context_drops_blank_reason() {
        let ctx = MovementContext::manual(None, Some("   ".to_string()));
        assert_eq!(ctx.reason, None);
    }
}
