//! Inventory ledger domain module.
//!
//! This crate contains the stock ledger's business rules, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage): what a ledger entry
//! is, which invariants it must satisfy, and how a reconciliation is planned
//! from a product's current stock.

pub mod movement;
pub mod product;
pub mod reconcile;

pub use movement::{MovementContext, MovementType, Origin, StockMovement};
pub use product::{NewProduct, Product, StockSnapshot};
pub use reconcile::{
    GuardDecision, StockChange, StockTarget, check_delta_sign, merge_changes, order_guard,
    plan_movement,
};
