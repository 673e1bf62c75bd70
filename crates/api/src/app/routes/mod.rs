use axum::{routing::get, Router};

pub mod common;
pub mod orders;
pub mod products;
pub mod stock_movements;
pub mod system;

/// Protected routes; the caller layers auth and services on top.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/stock-movements", stock_movements::router())
        .nest("/products", products::router())
        .nest("/orders", orders::router())
}
