use axum::{
    routing::{get, post},
    Router,
};

pub mod reservations;
pub mod stocks;
pub mod system;

/// Router for the versioned API, mounted under `/api/v1`.
pub fn router() -> Router {
    Router::new()
        .route(
            "/reservations",
            post(reservations::create_reservations).delete(reservations::delete_reservations),
        )
        .route("/stocks", get(stocks::get_stocks))
        .route("/warehouses/:id/stocks", get(stocks::get_warehouse_stocks))
}
