use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, Query},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use stockledger_auth::Permission;
use stockledger_infra::FilterParams;

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_movements))
        .route("/empty-sku-count", get(empty_sku_count))
        .route("/export.csv", get(export_csv))
        .route("/export", get(export_csv))
        .route("/export.xlsx", get(export_xlsx))
}

fn authorize_read(principal: &PrincipalContext, params: FilterParams) -> Result<FilterParams, Response> {
    let cmd = CmdAuth::new(params, Permission::STOCK_MOVEMENTS_READ);
    crate::authz::authorize_command(principal, &cmd).map_err(errors::forbidden)?;
    Ok(cmd.inner)
}

fn attachment_name(ext: &str) -> String {
    format!(
        "attachment; filename=\"stock-movements-{}.{ext}\"",
        Utc::now().format("%Y-%m-%d")
    )
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<FilterParams>,
) -> Response {
    let params = match authorize_read(&principal, params) {
        Ok(p) => p,
        Err(res) => return res,
    };
    match services.movements.query(&params).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::query_error_to_response(e),
    }
}

pub async fn empty_sku_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<FilterParams>,
) -> Response {
    let params = match authorize_read(&principal, params) {
        Ok(p) => p,
        Err(res) => return res,
    };
    match services.movements.count_empty_sku(&params).await {
        Ok(count) => Json(serde_json::json!({ "count": count })).into_response(),
        Err(e) => errors::query_error_to_response(e),
    }
}

/// Rows are streamed in batches; filters are validated before the first byte.
pub async fn export_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<FilterParams>,
) -> Response {
    let params = match authorize_read(&principal, params) {
        Ok(p) => p,
        Err(res) => return res,
    };
    let stream = match services.exports.csv(&params) {
        Ok(s) => s,
        Err(e) => return errors::query_error_to_response(e),
    };
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment_name("csv")),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

pub async fn export_xlsx(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<FilterParams>,
) -> Response {
    let params = match authorize_read(&principal, params) {
        Ok(p) => p,
        Err(res) => return res,
    };
    match services.exports.xlsx(&params).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (header::CONTENT_DISPOSITION, attachment_name("xlsx")),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => errors::query_error_to_response(e),
    }
}
