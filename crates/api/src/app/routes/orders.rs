use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};

use stockledger_auth::Permission;
use stockledger_core::OrderId;
use stockledger_orders::OrderStatus;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(change_status))
}

fn parse_order_id(raw: &str) -> Result<OrderId, Response> {
    raw.parse().map_err(|_| errors::invalid_id("order", raw))
}

/// Creates the order and takes its items out of stock in one step.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> Response {
    let cmd = CmdAuth::new(body, Permission::ORDERS_WRITE);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    let new_order = match cmd.inner.into_new_order() {
        Ok(o) => o,
        Err(e) => return errors::reconcile_error_to_response(e),
    };

    match services
        .orders
        .create_order(new_order, Some(principal.user_id()))
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd = CmdAuth::new(order_id, Permission::ORDERS_READ);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    match services.orders.get_order(cmd.inner).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStatusRequest>,
) -> Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd = CmdAuth::new(body, Permission::ORDERS_WRITE);
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::forbidden(e);
    }

    let to: OrderStatus = match cmd.inner.status.parse() {
        Ok(s) => s,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", format!("{e}")),
    };

    match services
        .orders
        .change_status(order_id, to, Some(principal.user_id()))
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
