use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Maximum length of a product SKU, in characters.
pub const SKU_MAX_LENGTH: usize = 12;

/// Product stock-keeping unit.
///
/// Deserialization accepts any string so that an oversized SKU is reported as
/// `InvalidSku` rather than as an undecodable body; call [`Sku::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Build a SKU, rejecting empty or oversized values.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let sku = Self(value.into());
        sku.validate()?;
        Ok(sku)
    }

    /// Wrap a value loaded from storage without re-validating it.
    pub fn from_trusted(value: String) -> Self {
        Self(value)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.trim().is_empty() || self.0.chars().count() > SKU_MAX_LENGTH {
            return Err(ValidationError::InvalidSku);
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_up_to_max_length() {
        assert!(Sku::parse("A").is_ok());
        assert!(Sku::parse("x".repeat(SKU_MAX_LENGTH)).is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert_eq!(Sku::parse(""), Err(ValidationError::InvalidSku));
        assert_eq!(Sku::parse("   "), Err(ValidationError::InvalidSku));
        assert_eq!(
            Sku::parse("x".repeat(SKU_MAX_LENGTH + 1)),
            Err(ValidationError::InvalidSku)
        );
    }

    #[test]
    fn length_is_counted_in_characters() {
        // 12 Cyrillic letters are 24 bytes.
        assert!(Sku::parse("футболкафутб").is_ok());
    }
}
