//! Infrastructure layer: stores, reservation engine, expiry sweeper, config.

pub mod config;
pub mod engine;
pub mod store;
pub mod sweeper;

pub use config::{Config, ConfigError, DatabaseConfig};
pub use engine::{ErrorKind, ReservationEngine, ReservationError, RetryPolicy};
pub use store::{
    InMemoryWarehouseStore, PostgresWarehouseStore, StoreError, StoreTransaction, WarehouseStore,
};
pub use sweeper::{ExpirySweeper, ExpirySweeperHandle};
