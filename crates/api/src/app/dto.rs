use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use stockhold_core::{ReservationId, WarehouseId};
use stockhold_inventory::{DeleteReservation, ReservationRequest, Sku};

// -------------------------
// Request DTOs
// -------------------------

/// One element of the `POST /reservations` body.
///
/// Malformed UUIDs, negative quantities and unparsable dates fail while the
/// body is decoded; everything else is checked by the engine.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: String,
    pub quantity: u32,
    pub due_date: DateTime<Utc>,
}

impl CreateReservationRequest {
    pub fn into_domain(self) -> ReservationRequest {
        ReservationRequest {
            id: ReservationId::from_uuid(self.id),
            warehouse_id: WarehouseId::from_uuid(self.warehouse_id),
            // Length is checked by engine validation so it maps to `invalid_sku`.
            product_id: Sku::from_trusted(self.product_id),
            quantity: self.quantity,
            due_date: self.due_date,
        }
    }
}

/// One element of the `DELETE /reservations` body. Other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct DeleteReservationRequest {
    pub id: Uuid,
}

impl DeleteReservationRequest {
    pub fn into_domain(self) -> DeleteReservation {
        DeleteReservation {
            id: ReservationId::from_uuid(self.id),
        }
    }
}
