use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use stockhold_core::WarehouseId;
use stockhold_inventory::GetParams;

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn get_stocks(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> axum::response::Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };

    match services.engine.get_stocks(&params).await {
        Ok(stocks) => Json(stocks).into_response(),
        Err(e) => errors::reservation_error_to_response("get_stocks", e),
    }
}

pub async fn get_warehouse_stocks(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> axum::response::Response {
    let warehouse_id = match id.parse::<WarehouseId>() {
        Ok(id) => id,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_uuid", e.to_string()),
    };
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };

    match services
        .engine
        .get_warehouse_stocks(warehouse_id, &params)
        .await
    {
        Ok(stocks) => Json(stocks).into_response(),
        Err(e) => errors::reservation_error_to_response("get_warehouse_stocks", e),
    }
}
