use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn create_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Vec<dto::CreateReservationRequest>>, JsonRejection>,
) -> axum::response::Response {
    let Json(items) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let batch = items
        .into_iter()
        .map(dto::CreateReservationRequest::into_domain)
        .collect();

    match services.engine.create_reservations(batch).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => errors::reservation_error_to_response("create_reservations", e),
    }
}

pub async fn delete_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Vec<dto::DeleteReservationRequest>>, JsonRejection>,
) -> axum::response::Response {
    let Json(items) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let batch = items
        .into_iter()
        .map(dto::DeleteReservationRequest::into_domain)
        .collect();

    match services.engine.delete_reservations(batch).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::reservation_error_to_response("delete_reservations", e),
    }
}
