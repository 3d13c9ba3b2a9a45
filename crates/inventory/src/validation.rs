//! Request validation errors.
//!
//! Everything here is decided without touching a store.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid reservation id")]
    InvalidId,

    #[error("invalid warehouse id")]
    InvalidWarehouseId,

    #[error("invalid product sku")]
    InvalidSku,

    #[error("due date must be in the future")]
    IncorrectDueDate,

    #[error("quantity must be positive")]
    InvalidQuantity,

    #[error("batch is empty")]
    EmptyBatch,

    #[error("invalid get params: {0}")]
    InvalidGetParams(String),
}

impl ValidationError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidId | ValidationError::InvalidWarehouseId => "invalid_uuid",
            ValidationError::InvalidSku => "invalid_sku",
            ValidationError::IncorrectDueDate => "incorrect_due_date",
            ValidationError::InvalidQuantity => "invalid_quantity",
            ValidationError::EmptyBatch => "empty_batch",
            ValidationError::InvalidGetParams(_) => "invalid_get_params",
        }
    }
}
