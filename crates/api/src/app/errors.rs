use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use stockhold_infra::ReservationError;

/// Map an engine error to its HTTP response.
///
/// | Error | Status | Code |
/// |-------|--------|------|
/// | `Validation` | 400 | per validation error |
/// | `StockNotFound` | 404 | `stock_not_found` |
/// | `ReservationNotFound` | 404 | `reservation_not_found` |
/// | `NotEnoughQuantity` | 422 | `not_enough_quantity` |
/// | `DuplicateReservation` | 429 | `duplicate_reservation` |
/// | `SerializationConflict` | 500 | `transaction_conflict` |
/// | `Transaction` | 500 | `transaction_error` |
pub fn reservation_error_to_response(
    operation: &'static str,
    err: ReservationError,
) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ReservationError::Validation(e) => json_error(StatusCode::BAD_REQUEST, e.code(), message),
        ReservationError::StockNotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, "stock_not_found", message)
        }
        ReservationError::ReservationNotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, "reservation_not_found", message)
        }
        ReservationError::NotEnoughQuantity { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "not_enough_quantity", message)
        }
        ReservationError::DuplicateReservation { .. } => {
            json_error(StatusCode::TOO_MANY_REQUESTS, "duplicate_reservation", message)
        }
        ReservationError::SerializationConflict(_) => {
            error!(operation, error = %message, "transaction conflict not resolved by retries");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "transaction_conflict", message)
        }
        ReservationError::Transaction(_) => {
            error!(operation, error = %message, "transaction failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "transaction_error", message)
        }
    }
}

/// Undecodable JSON body (syntax, missing field, malformed UUID or date).
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection_to_response(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_get_params", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
