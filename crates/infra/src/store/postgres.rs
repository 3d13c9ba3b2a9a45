//! Postgres-backed warehouse store.
//!
//! Every write transaction runs at `SERIALIZABLE`. Ledger updates are single
//! conditional `UPDATE ... RETURNING` statements, so the
//! `reserved_quantity <= quantity` check and the write happen atomically in
//! the database; the `stocks_reserved_within_quantity` check constraint backs
//! it up.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `AlreadyExists` / `DuplicateReservation` | Duplicate catalog row or reservation id |
//! | Database (foreign key violation) | `23503` | `UnknownReference` | Stock or reservation pointing at a missing row |
//! | Database (check constraint violation) | `23514` | `Invariant` | Ledger invariant refused by the schema |
//! | Database (serialization failure) | `40001` | `SerializationConflict` | Concurrent transaction won; retry the whole batch |
//! | Database (deadlock detected) | `40P01` | `SerializationConflict` | Same as above |
//! | Database (other) | Any other | `Database` | Other database errors |
//! | PoolClosed / PoolTimedOut / Other | N/A | `Database` | Network errors, exhausted pool, etc. |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use stockhold_core::{ReservationId, WarehouseId};
use stockhold_inventory::{
    Product, Reservation, ReservationRequest, Sku, Stock, StockKey, StockQuery, StockSort,
    Warehouse,
};

use super::r#trait::{StoreError, StoreTransaction, WarehouseStore};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const STOCK_COLUMNS: &str =
    "warehouse_id, product_id, quantity, reserved_quantity, created_at, modified_at";

const RESERVATION_COLUMNS: &str =
    "id, warehouse_id, product_id, quantity, created_at, due_date, is_active";

#[derive(Debug, Clone)]
pub struct PostgresWarehouseStore {
    pool: Arc<PgPool>,
}

impl PostgresWarehouseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized and bounded by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WarehouseStore for PostgresWarehouseStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    async fn get_stocks(&self, query: &StockQuery) -> Result<Vec<Stock>, StoreError> {
        let sql = stock_listing_sql(query);
        let rows = sqlx::query(&sql)
            .bind(query.warehouse.map(uuid::Uuid::from))
            .bind(query.product.as_ref().map(Sku::as_str))
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_stocks", e))?;

        let stocks = rows
            .iter()
            .map(|row| decode_stock("get_stocks", row))
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("rows", stocks.len());
        Ok(stocks)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn get_stock(&self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks WHERE warehouse_id = $1 AND product_id = $2"
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_stock", e))?;

        row.map(|row| decode_stock("get_stock", &row)).transpose()
    }

    #[instrument(skip(self), fields(reservation_id = %id), err)]
    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reservation", e))?;

        row.map(|row| decode_reservation("get_reservation", &row))
            .transpose()
    }

    #[instrument(skip(self, warehouse), fields(warehouse_id = %warehouse.id), err)]
    async fn create_warehouse(&self, mut warehouse: Warehouse) -> Result<Warehouse, StoreError> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO warehouses (id, name, is_active)
            VALUES ($1, $2, $3)
            RETURNING created_at
            "#,
        )
        .bind(warehouse.id.as_uuid())
        .bind(&warehouse.name)
        .bind(warehouse.is_active)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_warehouse", e))?;

        warehouse.created_at = created_at;
        Ok(warehouse)
    }

    #[instrument(skip(self, product), fields(sku = %product.sku), err)]
    async fn create_product(&self, mut product: Product) -> Result<Product, StoreError> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO products (sku, name, size)
            VALUES ($1, $2, $3)
            RETURNING created_at
            "#,
        )
        .bind(product.sku.as_str())
        .bind(&product.name)
        .bind(&product.size)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_product", e))?;

        product.created_at = created_at;
        Ok(product)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn create_stock(&self, key: StockKey, quantity: u32) -> Result<Stock, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO stocks (warehouse_id, product_id, quantity)
            VALUES ($1, $2, $3)
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_stock", e))?;

        decode_stock("create_stock", &row)
    }

    #[instrument(skip(self), err)]
    async fn truncate(&self) -> Result<(), StoreError> {
        sqlx::query("TRUNCATE reservations, stocks, products, warehouses")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("truncate", e))?;
        Ok(())
    }
}

/// Sort expression for a listing column. SKUs compare with the "C"
/// collation so pages come back in byte order whatever the database locale.
fn order_expression(sort: StockSort) -> &'static str {
    match sort {
        StockSort::WarehouseId => "warehouse_id",
        StockSort::ProductId => r#"product_id COLLATE "C""#,
        StockSort::Quantity => "quantity",
        StockSort::ReservedQuantity => "reserved_quantity",
        StockSort::CreatedAt => "created_at",
        StockSort::ModifiedAt => "modified_at",
    }
}

fn stock_listing_sql(query: &StockQuery) -> String {
    // The ORDER BY expression comes from a closed enum, never from caller text.
    let direction = if query.descending { "DESC" } else { "ASC" };
    format!(
        r#"
        SELECT {STOCK_COLUMNS}
        FROM stocks
        WHERE ($1::uuid IS NULL OR warehouse_id = $1)
          AND ($2::text IS NULL OR product_id = $2)
        ORDER BY {order} {direction}, warehouse_id ASC, product_id COLLATE "C" ASC
        LIMIT $3 OFFSET $4
        "#,
        order = order_expression(query.sort),
    )
}

/// Open serializable transaction. Rolled back by sqlx when dropped uncommitted.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    /// Explain why a conditional ledger update matched no row.
    async fn ledger_miss(
        &mut self,
        operation: &str,
        key: &StockKey,
        requested: u32,
    ) -> Result<StoreError, StoreError> {
        let row = sqlx::query(
            "SELECT quantity, reserved_quantity FROM stocks WHERE warehouse_id = $1 AND product_id = $2",
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;

        let Some(row) = row else {
            return Ok(StoreError::StockNotFound { key: key.clone() });
        };
        let quantity = to_u32(operation, row.try_get("quantity"))?;
        let reserved = to_u32(operation, row.try_get("reserved_quantity"))?;

        Ok(match operation {
            "reserve_stock" => StoreError::NotEnoughQuantity {
                key: key.clone(),
                requested,
                available: quantity.saturating_sub(reserved),
            },
            _ => StoreError::Invariant(format!(
                "release of {requested} exceeds reserved quantity {reserved} for {key}"
            )),
        })
    }
}

#[async_trait::async_trait]
impl StoreTransaction for PostgresTransaction {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn reserve_stock(&mut self, key: &StockKey, quantity: u32) -> Result<Stock, StoreError> {
        if quantity == 0 {
            return Err(StoreError::Invariant(format!(
                "reserve quantity must be positive for {key}"
            )));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE stocks
            SET reserved_quantity = reserved_quantity + $3, modified_at = NOW()
            WHERE warehouse_id = $1 AND product_id = $2
              AND quantity - reserved_quantity >= $3
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_stock", e))?;

        match row {
            Some(row) => decode_stock("reserve_stock", &row),
            None => Err(self.ledger_miss("reserve_stock", key, quantity).await?),
        }
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn release_stock(&mut self, key: &StockKey, quantity: u32) -> Result<Stock, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stocks
            SET reserved_quantity = reserved_quantity - $3, modified_at = NOW()
            WHERE warehouse_id = $1 AND product_id = $2
              AND reserved_quantity >= $3
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("release_stock", e))?;

        match row {
            Some(row) => decode_stock("release_stock", &row),
            None => Err(self.ledger_miss("release_stock", key, quantity).await?),
        }
    }

    #[instrument(skip(self, request), fields(reservation_id = %request.id), err)]
    async fn insert_reservation(
        &mut self,
        request: ReservationRequest,
    ) -> Result<Reservation, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO reservations (id, warehouse_id, product_id, quantity, due_date, is_active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(request.id.as_uuid())
        .bind(request.warehouse_id.as_uuid())
        .bind(request.product_id.as_str())
        .bind(i64::from(request.quantity))
        .bind(request.due_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match map_sqlx_error("insert_reservation", e) {
            StoreError::AlreadyExists(_) => StoreError::DuplicateReservation(request.id),
            other => other,
        })?;

        decode_reservation("insert_reservation", &row)
    }

    #[instrument(skip(self), fields(reservation_id = %id), err)]
    async fn deactivate_reservation(
        &mut self,
        id: ReservationId,
    ) -> Result<Reservation, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET is_active = FALSE
            WHERE id = $1 AND is_active
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("deactivate_reservation", e))?;

        match row {
            Some(row) => decode_reservation("deactivate_reservation", &row),
            None => Err(StoreError::ReservationNotFound(id)),
        }
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    async fn deactivate_expired(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET is_active = FALSE
            WHERE is_active AND due_date < $1
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("deactivate_expired", e))?;

        let mut expired = rows
            .iter()
            .map(|row| decode_reservation("deactivate_expired", row))
            .collect::<Result<Vec<_>, _>>()?;
        expired.sort_by_key(|r| (r.due_date, r.id));

        Span::current().record("rows", expired.len());
        Ok(expired)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

/// Row struct for the `stocks` table.
struct StockRow {
    warehouse_id: uuid::Uuid,
    product_id: String,
    quantity: i64,
    reserved_quantity: i64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            warehouse_id: row.try_get("warehouse_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            reserved_quantity: row.try_get("reserved_quantity")?,
            created_at: row.try_get("created_at")?,
            modified_at: row.try_get("modified_at")?,
        })
    }
}

impl StockRow {
    fn into_stock(self, operation: &str) -> Result<Stock, StoreError> {
        let key = StockKey::new(
            WarehouseId::from_uuid(self.warehouse_id),
            Sku::from_trusted(self.product_id),
        );
        Stock::restore(
            key,
            to_u32(operation, Ok(self.quantity))?,
            to_u32(operation, Ok(self.reserved_quantity))?,
            self.created_at,
            self.modified_at,
        )
        .map_err(|e| StoreError::Invariant(e.to_string()))
    }
}

/// Row struct for the `reservations` table.
struct ReservationRow {
    id: uuid::Uuid,
    warehouse_id: uuid::Uuid,
    product_id: String,
    quantity: i64,
    created_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
    is_active: bool,
}

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            id: row.try_get("id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            created_at: row.try_get("created_at")?,
            due_date: row.try_get("due_date")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl ReservationRow {
    fn into_reservation(self, operation: &str) -> Result<Reservation, StoreError> {
        Ok(Reservation {
            id: ReservationId::from_uuid(self.id),
            warehouse_id: WarehouseId::from_uuid(self.warehouse_id),
            product_id: Sku::from_trusted(self.product_id),
            quantity: to_u32(operation, Ok(self.quantity))?,
            created_at: self.created_at,
            due_date: self.due_date,
            is_active: self.is_active,
        })
    }
}

fn decode_stock(operation: &str, row: &PgRow) -> Result<Stock, StoreError> {
    StockRow::from_row(row)
        .map_err(|e| map_sqlx_error(operation, e))?
        .into_stock(operation)
}

fn decode_reservation(operation: &str, row: &PgRow) -> Result<Reservation, StoreError> {
    ReservationRow::from_row(row)
        .map_err(|e| map_sqlx_error(operation, e))?
        .into_reservation(operation)
}

/// Quantities are stored as BIGINT; anything outside `u32` is corrupt data.
fn to_u32(operation: &str, value: Result<i64, sqlx::Error>) -> Result<u32, StoreError> {
    let value = value.map_err(|e| map_sqlx_error(operation, e))?;
    u32::try_from(value).map_err(|_| {
        StoreError::Invariant(format!("quantity {value} out of range in {operation}"))
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                Some("23503") => StoreError::UnknownReference(msg),
                Some("23514") => StoreError::Invariant(msg),
                Some("40001") | Some("40P01") => StoreError::SerializationConflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Database(format!("connection pool timed out in {operation}"))
        }
        _ => StoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}
