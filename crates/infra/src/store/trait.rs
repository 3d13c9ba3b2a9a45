use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockhold_core::ReservationId;
use stockhold_inventory::{
    LedgerError, Product, Reservation, ReservationRequest, Stock, StockKey, StockQuery, Warehouse,
};

/// Errors produced at the storage boundary.
///
/// Backend-specific failures (SQLSTATE codes, lock poisoning, ...) are
/// translated into these variants before they leave the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("stock {key} not found")]
    StockNotFound { key: StockKey },

    #[error("not enough quantity of {key}: requested {requested}, available {available}")]
    NotEnoughQuantity {
        key: StockKey,
        requested: u32,
        available: u32,
    },

    #[error("duplicate reservation {0}")]
    DuplicateReservation(ReservationId),

    #[error("active reservation {0} not found")]
    ReservationNotFound(ReservationId),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unknown reference: {0}")]
    UnknownReference(String),

    /// The transaction lost a serialization race and may be retried as a whole.
    #[error("serialization conflict: {0}")]
    SerializationConflict(String),

    /// A stored row broke a ledger invariant (check constraint or bad data).
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Translate a ledger arithmetic failure for `key`.
    pub fn from_ledger(key: &StockKey, err: LedgerError) -> Self {
        match err {
            LedgerError::NotEnoughQuantity {
                requested,
                available,
            } => StoreError::NotEnoughQuantity {
                key: key.clone(),
                requested,
                available,
            },
            LedgerError::Domain(e) => StoreError::Invariant(e.to_string()),
        }
    }
}

/// Backing store for stock, reservations and catalog rows.
///
/// Writes that must be atomic go through [`WarehouseStore::begin`]; the rest
/// are single statements.
#[async_trait::async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Open a transaction with serializable isolation.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// One page of stock rows.
    async fn get_stocks(&self, query: &StockQuery) -> Result<Vec<Stock>, StoreError>;

    async fn get_stock(&self, key: &StockKey) -> Result<Option<Stock>, StoreError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn create_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse, StoreError>;

    async fn create_product(&self, product: Product) -> Result<Product, StoreError>;

    /// Stock a (warehouse, product) pair with nothing reserved.
    async fn create_stock(&self, key: StockKey, quantity: u32) -> Result<Stock, StoreError>;

    /// Remove every row from every table.
    async fn truncate(&self) -> Result<(), StoreError>;
}

/// A serializable transaction over the ledger and the reservation table.
///
/// Dropping the handle without a successful [`StoreTransaction::commit`]
/// rolls back everything done through it.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Atomically add `quantity` to the reserved pool of `key` if it fits.
    async fn reserve_stock(&mut self, key: &StockKey, quantity: u32) -> Result<Stock, StoreError>;

    /// Atomically return `quantity` from the reserved pool of `key`.
    async fn release_stock(&mut self, key: &StockKey, quantity: u32) -> Result<Stock, StoreError>;

    /// Insert an active reservation; the store assigns `created_at`.
    async fn insert_reservation(
        &mut self,
        request: ReservationRequest,
    ) -> Result<Reservation, StoreError>;

    /// Flip one active reservation to inactive and return the updated row.
    async fn deactivate_reservation(&mut self, id: ReservationId)
    -> Result<Reservation, StoreError>;

    /// Flip every active reservation due before `now` to inactive and return
    /// the updated rows, oldest due date first.
    async fn deactivate_expired(&mut self, now: DateTime<Utc>)
    -> Result<Vec<Reservation>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> WarehouseStore for Arc<S>
where
    S: WarehouseStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn get_stocks(&self, query: &StockQuery) -> Result<Vec<Stock>, StoreError> {
        (**self).get_stocks(query).await
    }

    async fn get_stock(&self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
        (**self).get_stock(key).await
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).get_reservation(id).await
    }

    async fn create_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse, StoreError> {
        (**self).create_warehouse(warehouse).await
    }

    async fn create_product(&self, product: Product) -> Result<Product, StoreError> {
        (**self).create_product(product).await
    }

    async fn create_stock(&self, key: StockKey, quantity: u32) -> Result<Stock, StoreError> {
        (**self).create_stock(key, quantity).await
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        (**self).truncate().await
    }
}
