use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, OrderId, ProductId};
use stockledger_inventory::{MovementType, StockChange};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_cancelled(self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" | "CANCELED" => Ok(OrderStatus::Cancelled),
            _ => Err(DomainError::validation(format!("unknown order status '{s}'"))),
        }
    }
}

/// Stock effect of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    /// Return every item to stock (`ORDER_CANCEL`).
    Release,
    /// Take every item out of stock again (`ORDER_RESTORE`).
    Reserve,
}

impl StockEffect {
    /// Map a transition to its stock effect.
    ///
    /// Entering `CANCELLED` releases stock, including a repeated cancel (which
    /// the engine turns into a no-op). Leaving `CANCELLED` for an active status
    /// reserves it again.
    pub fn of_transition(from: OrderStatus, to: OrderStatus) -> StockEffect {
        match (from.is_cancelled(), to.is_cancelled()) {
            (_, true) => StockEffect::Release,
            (true, false) => StockEffect::Reserve,
            (false, false) => StockEffect::None,
        }
    }

    pub fn movement_type(self) -> Option<MovementType> {
        match self {
            StockEffect::None => None,
            StockEffect::Release => Some(MovementType::OrderCancel),
            StockEffect::Reserve => Some(MovementType::OrderRestore),
        }
    }
}

/// Order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Order creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::validation("an order must have at least one item"));
        }
        if let Some(bad) = self.items.iter().find(|i| i.quantity < 1) {
            return Err(DomainError::validation(format!(
                "item quantity must be at least 1 (product {}, got {})",
                bad.product_id, bad.quantity
            )));
        }
        Ok(())
    }

    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Result<Order, DomainError> {
        self.validate()?;
        Ok(Order {
            id,
            status: OrderStatus::Pending,
            items: self.items,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Stock changes for a movement type, signed per the ledger convention:
    /// create/restore take stock out, cancel puts it back.
    pub fn stock_changes(&self, movement_type: MovementType) -> Vec<StockChange> {
        let sign = match movement_type {
            MovementType::OrderCancel => 1,
            _ => -1,
        };
        self.items
            .iter()
            .map(|i| StockChange::new(i.product_id, sign * i.quantity))
            .collect()
    }

    pub fn transition(&self, to: OrderStatus) -> StockEffect {
        StockEffect::of_transition(self.status, to)
    }
}
