use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use stockledger_auth::AuthzError;
use stockledger_infra::store::StoreError;
use stockledger_infra::{QueryError, ReconcileError};

pub fn reconcile_error_to_response(err: ReconcileError) -> Response {
    match err {
        ReconcileError::InsufficientStock {
            product_id,
            available,
            requested,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock for product {product_id}: available {available}, requested {requested}"
                ),
                "productId": product_id.to_string(),
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        e @ ReconcileError::ConcurrentModification { .. } => {
            json_error(StatusCode::CONFLICT, "concurrent_modification", e.to_string())
        }
        ReconcileError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ReconcileError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ReconcileError::Store(e) => store_error_to_response(e),
    }
}

pub fn query_error_to_response(err: QueryError) -> Response {
    match err {
        QueryError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        QueryError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        QueryError::Store(e) => store_error_to_response(e),
        QueryError::Export(msg) => {
            tracing::error!(error = %msg, "export failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "export_error", msg)
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        StoreError::Invalid(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        e @ (StoreError::Timeout(_) | StoreError::Backend(_)) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn forbidden(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id(kind: &str, raw: &str) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_id",
        format!("'{raw}' is not a valid {kind} id"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::ProductId;

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (
                ReconcileError::InsufficientStock {
                    product_id: ProductId::new(),
                    available: 4,
                    requested: 6,
                },
                StatusCode::CONFLICT,
            ),
            (
                ReconcileError::ConcurrentModification {
                    subject: "product".into(),
                    attempts: 5,
                },
                StatusCode::CONFLICT,
            ),
            (ReconcileError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ReconcileError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                ReconcileError::Store(StoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(reconcile_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn read_side_errors_map_to_statuses() {
        assert_eq!(
            query_error_to_response(QueryError::Validation("from".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            query_error_to_response(QueryError::Export("xlsx".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            store_error_to_response(StoreError::Conflict("sku".into())).status(),
            StatusCode::CONFLICT
        );
    }
}
