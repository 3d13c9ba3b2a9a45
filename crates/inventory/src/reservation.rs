use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::{ReservationId, WarehouseId};

use crate::sku::Sku;
use crate::stock::StockKey;
use crate::validation::ValidationError;

/// A persisted reservation.
///
/// While `is_active` is true its `quantity` is counted in the referenced
/// stock's reserved pool. Once inactive it never becomes active again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub warehouse_id: WarehouseId,
    pub product_id: Sku,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub is_active: bool,
}

impl Reservation {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id.clone())
    }

    /// Active and past its due date: the sweeper must release it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.due_date < now
    }
}

/// One item of a create batch, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub id: ReservationId,
    pub warehouse_id: WarehouseId,
    pub product_id: Sku,
    pub quantity: u32,
    pub due_date: DateTime<Utc>,
}

impl ReservationRequest {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id.clone())
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.id.is_nil() {
            return Err(ValidationError::InvalidId);
        }
        if self.warehouse_id.is_nil() {
            return Err(ValidationError::InvalidWarehouseId);
        }
        self.product_id.validate()?;
        if self.due_date <= now {
            return Err(ValidationError::IncorrectDueDate);
        }
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity);
        }
        Ok(())
    }

    /// The row to insert, active from `created_at`.
    pub fn into_reservation(self, created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id: self.id,
            warehouse_id: self.warehouse_id,
            product_id: self.product_id,
            quantity: self.quantity,
            created_at,
            due_date: self.due_date,
            is_active: true,
        }
    }
}

/// One item of a delete batch. Extra fields in the payload are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReservation {
    pub id: ReservationId,
}

impl DeleteReservation {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_nil() {
            return Err(ValidationError::InvalidId);
        }
        Ok(())
    }
}

/// Validate a whole create batch; the first offending item decides the error.
pub fn validate_create_batch(
    batch: &[ReservationRequest],
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if batch.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    batch.iter().try_for_each(|r| r.validate(now))
}

pub fn validate_delete_batch(batch: &[DeleteReservation]) -> Result<(), ValidationError> {
    if batch.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    batch.iter().try_for_each(DeleteReservation::validate)
}
