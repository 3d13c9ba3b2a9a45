use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockhold_core::{ReservationId, WarehouseId};
use stockhold_inventory::{
    Product, Reservation, ReservationRequest, Sku, Stock, StockKey, StockQuery, Warehouse,
};

use super::r#trait::{StoreError, StoreTransaction, WarehouseStore};

#[derive(Debug, Clone, Default)]
struct State {
    warehouses: HashMap<WarehouseId, Warehouse>,
    products: HashMap<Sku, Product>,
    stocks: HashMap<StockKey, Stock>,
    reservations: HashMap<ReservationId, Reservation>,
}

/// In-memory store for tests/dev.
///
/// Transactions are serialized: `begin` takes the state lock and holds it
/// until the handle is committed or dropped, working on a private copy that
/// is only written back on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouseStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait::async_trait]
impl WarehouseStore for InMemoryWarehouseStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }

    async fn get_stocks(&self, query: &StockQuery) -> Result<Vec<Stock>, StoreError> {
        let state = self.state.lock().await;
        Ok(query.apply(state.stocks.values()))
    }

    async fn get_stock(&self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
        Ok(self.state.lock().await.stocks.get(key).cloned())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn create_warehouse(&self, mut warehouse: Warehouse) -> Result<Warehouse, StoreError> {
        let mut state = self.state.lock().await;
        if state.warehouses.contains_key(&warehouse.id) {
            return Err(StoreError::AlreadyExists(format!("warehouse {}", warehouse.id)));
        }
        warehouse.created_at = Utc::now();
        state.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(warehouse)
    }

    async fn create_product(&self, mut product: Product) -> Result<Product, StoreError> {
        let mut state = self.state.lock().await;
        if state.products.contains_key(&product.sku) {
            return Err(StoreError::AlreadyExists(format!("product {}", product.sku)));
        }
        product.created_at = Utc::now();
        state.products.insert(product.sku.clone(), product.clone());
        Ok(product)
    }

    async fn create_stock(&self, key: StockKey, quantity: u32) -> Result<Stock, StoreError> {
        let mut state = self.state.lock().await;
        if !state.warehouses.contains_key(&key.warehouse_id) {
            return Err(StoreError::UnknownReference(format!(
                "warehouse {}",
                key.warehouse_id
            )));
        }
        if !state.products.contains_key(&key.product_id) {
            return Err(StoreError::UnknownReference(format!(
                "product {}",
                key.product_id
            )));
        }
        if state.stocks.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("stock {key}")));
        }
        let stock = Stock::new(key.clone(), quantity, Utc::now());
        state.stocks.insert(key, stock.clone());
        Ok(stock)
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        *self.state.lock().await = State::default();
        Ok(())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

#[async_trait::async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn reserve_stock(&mut self, key: &StockKey, quantity: u32) -> Result<Stock, StoreError> {
        let stock = self
            .staged
            .stocks
            .get_mut(key)
            .ok_or_else(|| StoreError::StockNotFound { key: key.clone() })?;
        stock
            .reserve(quantity, Utc::now())
            .map_err(|e| StoreError::from_ledger(key, e))?;
        Ok(stock.clone())
    }

    async fn release_stock(&mut self, key: &StockKey, quantity: u32) -> Result<Stock, StoreError> {
        let stock = self
            .staged
            .stocks
            .get_mut(key)
            .ok_or_else(|| StoreError::StockNotFound { key: key.clone() })?;
        stock
            .release(quantity, Utc::now())
            .map_err(|e| StoreError::from_ledger(key, e))?;
        Ok(stock.clone())
    }

    async fn insert_reservation(
        &mut self,
        request: ReservationRequest,
    ) -> Result<Reservation, StoreError> {
        if self.staged.reservations.contains_key(&request.id) {
            return Err(StoreError::DuplicateReservation(request.id));
        }
        if !self.staged.stocks.contains_key(&request.key()) {
            return Err(StoreError::UnknownReference(format!("stock {}", request.key())));
        }
        let reservation = request.into_reservation(Utc::now());
        self.staged
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn deactivate_reservation(
        &mut self,
        id: ReservationId,
    ) -> Result<Reservation, StoreError> {
        match self.staged.reservations.get_mut(&id) {
            Some(reservation) if reservation.is_active => {
                reservation.is_active = false;
                Ok(reservation.clone())
            }
            _ => Err(StoreError::ReservationNotFound(id)),
        }
    }

    async fn deactivate_expired(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut expired = Vec::new();
        for reservation in self.staged.reservations.values_mut() {
            if reservation.is_expired_at(now) {
                reservation.is_active = false;
                expired.push(reservation.clone());
            }
        }
        expired.sort_by_key(|r| (r.due_date, r.id));
        Ok(expired)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
