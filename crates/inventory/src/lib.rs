//! Inventory domain: stock rows, reservations and the rules that guard them.
//!
//! This crate contains business rules only, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod catalog;
pub mod listing;
pub mod reservation;
pub mod sku;
pub mod stock;
pub mod validation;

pub use catalog::{Product, Warehouse};
pub use listing::{GetParams, StockQuery, StockSort, DEFAULT_LIMIT, MAX_LIMIT};
pub use reservation::{
    validate_create_batch, validate_delete_batch, DeleteReservation, Reservation,
    ReservationRequest,
};
pub use sku::{Sku, SKU_MAX_LENGTH};
pub use stock::{LedgerError, Stock, StockKey};
pub use validation::ValidationError;
