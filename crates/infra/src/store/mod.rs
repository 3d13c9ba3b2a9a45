//! Stock ledger and reservation store boundary.
//!
//! The engine talks to storage only through [`WarehouseStore`] and the
//! transaction handles it hands out. Two backends are provided: Postgres for
//! production and an in-memory store for tests and local runs.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryWarehouseStore;
pub use postgres::PostgresWarehouseStore;
pub use r#trait::{StoreError, StoreTransaction, WarehouseStore};
