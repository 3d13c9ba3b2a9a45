use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockhold_core::{DomainError, WarehouseId};

use crate::sku::Sku;

/// Compound identity of a stock row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub product_id: Sku,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, product_id: Sku) -> Self {
        Self {
            warehouse_id,
            product_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.warehouse_id)
    }
}

/// Failure of a ledger primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("not enough quantity: requested {requested}, available {available}")]
    NotEnoughQuantity { requested: u32, available: u32 },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Quantity on hand for one (warehouse, product) pair.
///
/// `quantity` is the physical count and never changes through reservations;
/// `reserved_quantity` is the share currently held by active reservations.
/// `0 <= reserved_quantity <= quantity` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub warehouse_id: WarehouseId,
    pub product_id: Sku,
    quantity: u32,
    reserved_quantity: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Stock {
    /// A freshly stocked row with nothing reserved.
    pub fn new(key: StockKey, quantity: u32, at: DateTime<Utc>) -> Self {
        Self {
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            quantity,
            reserved_quantity: 0,
            created_at: at,
            modified_at: at,
        }
    }

    /// Rebuild a row from storage, rejecting states that break the invariant.
    pub fn restore(
        key: StockKey,
        quantity: u32,
        reserved_quantity: u32,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if reserved_quantity > quantity {
            return Err(DomainError::invariant(format!(
                "stock {key}: reserved quantity {reserved_quantity} exceeds quantity {quantity}"
            )));
        }
        Ok(Self {
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            quantity,
            reserved_quantity,
            created_at,
            modified_at,
        })
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id.clone())
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn reserved_quantity(&self) -> u32 {
        self.reserved_quantity
    }

    pub fn free_quantity(&self) -> u32 {
        self.quantity - self.reserved_quantity
    }

    /// Move `quantity` units from the free pool into the reserved pool.
    ///
    /// Leaves the row untouched on failure.
    pub fn reserve(&mut self, quantity: u32, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(DomainError::validation("reserve quantity must be positive").into());
        }
        let available = self.free_quantity();
        if quantity > available {
            return Err(LedgerError::NotEnoughQuantity {
                requested: quantity,
                available,
            });
        }
        self.reserved_quantity += quantity;
        self.modified_at = at;
        Ok(())
    }

    /// Return `quantity` previously reserved units to the free pool.
    pub fn release(&mut self, quantity: u32, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if quantity > self.reserved_quantity {
            return Err(DomainError::invariant(format!(
                "release of {quantity} exceeds reserved quantity {} for {}",
                self.reserved_quantity,
                self.key()
            ))
            .into());
        }
        self.reserved_quantity -= quantity;
        self.modified_at = at;
        Ok(())
    }
}
