//! Catalog entities a stock row points at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::WarehouseId;

use crate::sku::Sku;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Warehouse {
    /// An active warehouse; `created_at` is replaced by the store on insert.
    pub fn new(id: WarehouseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub sku: Sku,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// A product without size; `created_at` is replaced by the store on insert.
    pub fn new(sku: Sku, name: impl Into<String>) -> Self {
        Self {
            sku,
            name: name.into(),
            size: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}
