//! Orders domain module.
//!
//! Orders own no stock. This crate only models the order itself and decides
//! which stock effect a lifecycle transition has; applying that effect is the
//! reconciliation engine's job.

pub mod order;

pub use order::{NewOrder, Order, OrderItem, OrderStatus, StockEffect};
