use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use stockledger_auth::Permission;
use stockledger_core::ProductId;
use stockledger_infra::{FilterParams, parse_target};
use stockledger_inventory::NewProduct;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/stock/low", get(low_stock))
        .route("/:id", get(get_product))
        .route("/:id/stock-adjust", post(adjust_stock))
        .route("/:id/stock/adjust", post(adjust_stock))
        .route("/:id/stock-movements", get(product_movements))
}

fn parse_product_id(raw: &str) -> Result<ProductId, Response> {
    raw.parse().map_err(|_| errors::invalid_id("product", raw))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewProduct>,
) -> Response {
    let cmd = CmdAuth::new(body, Permission::PRODUCTS_WRITE);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    let product = match cmd.inner.into_product(ProductId::new()) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    match services.catalog.register(product).await {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd = CmdAuth::new(product_id, Permission::PRODUCTS_READ);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    match services.catalog.get(cmd.inner).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::query_error_to_response(e),
    }
}

/// Set stock to an absolute value; the caller becomes `createdById`.
pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd = CmdAuth::new(body, Permission::STOCK_ADJUST);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    let new_stock = match parse_target(&cmd.inner.new_stock) {
        Ok(v) => v,
        Err(e) => return errors::reconcile_error_to_response(e),
    };

    match services
        .adjustments
        .adjust(product_id, new_stock, cmd.inner.reason.clone(), Some(principal.user_id()))
        .await
    {
        Ok(movement) => Json(movement).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn product_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(params): Query<FilterParams>,
) -> Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd = CmdAuth::new(params, Permission::STOCK_MOVEMENTS_READ);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    match services.movements.product_history(product_id, &cmd.inner).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::query_error_to_response(e),
    }
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LowStockQuery>,
) -> Response {
    let cmd = CmdAuth::new(query, Permission::PRODUCTS_READ);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    let threshold = match cmd.inner.threshold() {
        Ok(t) => t,
        Err(e) => return errors::reconcile_error_to_response(e),
    };
    match services.catalog.low_stock(threshold).await {
        Ok(products) => Json(serde_json::json!({ "data": products })).into_response(),
        Err(e) => errors::query_error_to_response(e),
    }
}
