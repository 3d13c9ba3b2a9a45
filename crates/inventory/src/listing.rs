//! Stock listing parameters: filter, sort and pagination.

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockhold_core::WarehouseId;

use crate::sku::{Sku, SKU_MAX_LENGTH};
use crate::stock::Stock;
use crate::validation::ValidationError;

/// Page size used when the caller does not pick one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page a caller may request.
pub const MAX_LIMIT: u32 = 100;

/// Raw listing parameters as they arrive from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetParams {
    pub offset: u32,
    pub limit: u32,
    pub sorting: String,
    pub descending: bool,
    pub warehouse_filter: String,
    pub product_filter: String,
}

/// Column a stock listing can be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StockSort {
    #[default]
    WarehouseId,
    ProductId,
    Quantity,
    ReservedQuantity,
    CreatedAt,
    ModifiedAt,
}

impl StockSort {
    fn compare(self, a: &Stock, b: &Stock) -> Ordering {
        match self {
            StockSort::WarehouseId => a.warehouse_id.cmp(&b.warehouse_id),
            StockSort::ProductId => a.product_id.cmp(&b.product_id),
            StockSort::Quantity => a.quantity().cmp(&b.quantity()),
            StockSort::ReservedQuantity => a.reserved_quantity().cmp(&b.reserved_quantity()),
            StockSort::CreatedAt => a.created_at.cmp(&b.created_at),
            StockSort::ModifiedAt => a.modified_at.cmp(&b.modified_at),
        }
    }
}

impl FromStr for StockSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warehouseId" | "warehouse_id" => Ok(StockSort::WarehouseId),
            "productId" | "product_id" => Ok(StockSort::ProductId),
            "quantity" => Ok(StockSort::Quantity),
            "reservedQuantity" | "reserved_quantity" => Ok(StockSort::ReservedQuantity),
            "createdAt" | "created_at" => Ok(StockSort::CreatedAt),
            "modifiedAt" | "modified_at" => Ok(StockSort::ModifiedAt),
            other => Err(ValidationError::InvalidGetParams(format!(
                "unknown sort column: {other}"
            ))),
        }
    }
}

/// Validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockQuery {
    pub offset: u32,
    pub limit: u32,
    pub sort: StockSort,
    pub descending: bool,
    pub warehouse: Option<WarehouseId>,
    pub product: Option<Sku>,
}

impl Default for StockQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            sort: StockSort::default(),
            descending: false,
            warehouse: None,
            product: None,
        }
    }
}

/// A value holding several whitespace-separated tokens is treated as an
/// injection attempt.
fn single_token<'a>(field: &str, value: &'a str) -> Result<Option<&'a str>, ValidationError> {
    let mut words = value.split_whitespace();
    let first = words.next();
    if words.next().is_some() {
        return Err(ValidationError::InvalidGetParams(format!(
            "{field} must be a single token"
        )));
    }
    Ok(first)
}

impl GetParams {
    pub fn validate(&self) -> Result<StockQuery, ValidationError> {
        let sorting = single_token("sorting", &self.sorting)?;
        let warehouse = single_token("warehouseFilter", &self.warehouse_filter)?;
        let product = single_token("productFilter", &self.product_filter)?;

        if self.product_filter.chars().count() > SKU_MAX_LENGTH {
            return Err(ValidationError::InvalidSku);
        }

        let sort = sorting
            .map(str::parse::<StockSort>)
            .transpose()?
            .unwrap_or_default();

        let warehouse = warehouse
            .map(|w| {
                w.parse::<WarehouseId>().map_err(|_| {
                    ValidationError::InvalidGetParams("warehouseFilter must be a uuid".to_string())
                })
            })
            .transpose()?;

        let limit = match self.limit {
            0 => DEFAULT_LIMIT,
            n => n.min(MAX_LIMIT),
        };

        Ok(StockQuery {
            offset: self.offset,
            limit,
            sort,
            descending: self.descending,
            warehouse,
            product: product.map(|p| Sku::from_trusted(p.to_string())),
        })
    }
}

impl StockQuery {
    /// Pin the listing to a single warehouse.
    pub fn with_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse = Some(warehouse_id);
        self
    }

    pub fn matches(&self, stock: &Stock) -> bool {
        self.warehouse.is_none_or(|w| stock.warehouse_id == w)
            && self.product.as_ref().is_none_or(|p| &stock.product_id == p)
    }

    /// Ordering for a page: the chosen column, then the stock key so that
    /// pagination is stable.
    pub fn compare(&self, a: &Stock, b: &Stock) -> Ordering {
        let primary = self.sort.compare(a, b);
        let primary = if self.descending {
            primary.reverse()
        } else {
            primary
        };
        primary
            .then_with(|| a.warehouse_id.cmp(&b.warehouse_id))
            .then_with(|| a.product_id.cmp(&b.product_id))
    }

    /// Apply filter, order and pagination to an in-memory set of rows.
    pub fn apply<'a>(&self, stocks: impl IntoIterator<Item = &'a Stock>) -> Vec<Stock> {
        let mut rows: Vec<&Stock> = stocks.into_iter().filter(|s| self.matches(s)).collect();
        rows.sort_by(|a, b| self.compare(a, b));
        rows.into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}
