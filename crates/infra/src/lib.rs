//! Infrastructure layer: stores, reconciliation, order lifecycle, read side
//! and configuration.

pub mod adjust;
pub mod config;
pub mod engine;
pub mod export;
pub mod lifecycle;
pub mod query;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use adjust::{ManualAdjustmentGateway, parse_target};
pub use config::{AppConfig, StorageConfig};
pub use engine::{ReconcileError, ReconciliationEngine, RetryPolicy};
pub use export::{DateFormat, ExportOptions, ExportService};
pub use lifecycle::{OrderLifecycleAdapter, OrderOutcome, OrderService};
pub use query::{CatalogService, FilterParams, MovementQueryService, QueryError};
