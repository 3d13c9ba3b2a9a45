//! Reservation engine: batch create/delete, expiry sweeps and stock listing.
//!
//! Every batch runs in one serializable store transaction, so either all of
//! its items take effect or none do. Transactions that lose a serialization
//! race are re-run from scratch under [`RetryPolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stockhold_core::{ReservationId, WarehouseId};
use stockhold_inventory::{
    validate_create_batch, validate_delete_batch, DeleteReservation, GetParams, Reservation,
    ReservationRequest, Sku, Stock, ValidationError,
};

use crate::store::{StoreError, WarehouseStore};

/// Error returned by every engine operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("stock of {sku} not found at warehouse {warehouse_id}")]
    StockNotFound { sku: Sku, warehouse_id: WarehouseId },

    #[error(
        "not enough quantity of {sku} at warehouse {warehouse_id}: requested {requested}, available {available}"
    )]
    NotEnoughQuantity {
        sku: Sku,
        warehouse_id: WarehouseId,
        requested: u32,
        available: u32,
    },

    #[error("reservation {id} already exists")]
    DuplicateReservation { id: ReservationId },

    #[error("active reservation {id} not found")]
    ReservationNotFound { id: ReservationId },

    /// Serialization conflict that survived every retry.
    #[error("transaction conflict: {0}")]
    SerializationConflict(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Capacity,
    Transaction,
}

impl ReservationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::Validation(_) => ErrorKind::Validation,
            ReservationError::StockNotFound { .. } | ReservationError::ReservationNotFound { .. } => {
                ErrorKind::NotFound
            }
            ReservationError::DuplicateReservation { .. } => ErrorKind::Conflict,
            ReservationError::NotEnoughQuantity { .. } => ErrorKind::Capacity,
            ReservationError::SerializationConflict(_) | ReservationError::Transaction(_) => {
                ErrorKind::Transaction
            }
        }
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StockNotFound { key } => ReservationError::StockNotFound {
                sku: key.product_id,
                warehouse_id: key.warehouse_id,
            },
            StoreError::NotEnoughQuantity {
                key,
                requested,
                available,
            } => ReservationError::NotEnoughQuantity {
                sku: key.product_id,
                warehouse_id: key.warehouse_id,
                requested,
                available,
            },
            StoreError::DuplicateReservation(id) => ReservationError::DuplicateReservation { id },
            StoreError::ReservationNotFound(id) => ReservationError::ReservationNotFound { id },
            StoreError::SerializationConflict(msg) => ReservationError::SerializationConflict(msg),
            other => ReservationError::Transaction(other.to_string()),
        }
    }
}

/// Bounded exponential backoff with jitter for serialization conflicts.
///
/// A conflict on a stock row means another transaction committed a write to
/// it, so a batch racing for one key sees at most one conflict per winner.
/// The default budget covers a burst of that size; jitter keeps losers from
/// retrying in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the delay after failed attempt `attempt` (1-based):
    /// base * 2^(attempt-1), capped at `max_backoff`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let pow = 1u32 << attempt.saturating_sub(1).min(10);
        self.base_backoff
            .saturating_mul(pow)
            .min(self.max_backoff)
    }

    /// Delay before re-running after failed attempt `attempt`, drawn from
    /// `[ceiling / 2, ceiling]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        self.ceiling(attempt).mul_f64(jitter)
    }
}

/// Entry point for reservation batches and stock listings.
#[derive(Clone)]
pub struct ReservationEngine {
    store: Arc<dyn WarehouseStore>,
    retry: RetryPolicy,
}

impl core::fmt::Debug for ReservationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReservationEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn WarehouseStore> {
        &self.store
    }

    /// Reserve every item of `batch` or none of them.
    ///
    /// Expired reservations are swept first so their quantity is available
    /// to this batch. A failed sweep is logged and does not block the batch.
    #[instrument(skip(self, batch), fields(items = batch.len()))]
    pub async fn create_reservations(
        &self,
        batch: Vec<ReservationRequest>,
    ) -> Result<Vec<Reservation>, ReservationError> {
        if let Err(err) = self.sweep_expired().await {
            warn!(error = %err, "inline expiry sweep failed");
        }

        validate_create_batch(&batch, Utc::now()).inspect_err(|err| {
            debug!(error = %err, "create batch rejected");
        })?;

        let result = self
            .retrying("create_reservations", || self.try_create(&batch))
            .await;
        log_outcome("create_reservations", &result);
        result
    }

    /// Deactivate every reservation of `batch` and release its quantity, or
    /// change nothing.
    #[instrument(skip(self, batch), fields(items = batch.len()))]
    pub async fn delete_reservations(
        &self,
        batch: Vec<DeleteReservation>,
    ) -> Result<(), ReservationError> {
        validate_delete_batch(&batch).inspect_err(|err| {
            debug!(error = %err, "delete batch rejected");
        })?;

        let result = self
            .retrying("delete_reservations", || self.try_delete(&batch))
            .await;
        log_outcome("delete_reservations", &result);
        result.map(|_| ())
    }

    /// Deactivate all active reservations past their due date and release
    /// their quantity. Returns the reservations released by this call.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<Vec<Reservation>, ReservationError> {
        let released = self
            .retrying("sweep_expired", || self.try_sweep())
            .await?;
        if !released.is_empty() {
            info!(released = released.len(), "expired reservations released");
        }
        Ok(released)
    }

    #[instrument(skip(self))]
    pub async fn get_stocks(&self, params: &GetParams) -> Result<Vec<Stock>, ReservationError> {
        let query = params.validate()?;
        Ok(self.store.get_stocks(&query).await?)
    }

    /// Same listing as [`Self::get_stocks`], pinned to one warehouse.
    #[instrument(skip(self, warehouse_id), fields(warehouse_id = %warehouse_id))]
    pub async fn get_warehouse_stocks(
        &self,
        warehouse_id: WarehouseId,
        params: &GetParams,
    ) -> Result<Vec<Stock>, ReservationError> {
        if warehouse_id.is_nil() {
            return Err(ValidationError::InvalidWarehouseId.into());
        }
        let query = params.validate()?.with_warehouse(warehouse_id);
        Ok(self.store.get_stocks(&query).await?)
    }

    async fn try_create(&self, batch: &[ReservationRequest]) -> Result<Vec<Reservation>, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut created = Vec::with_capacity(batch.len());
        for request in batch {
            tx.reserve_stock(&request.key(), request.quantity).await?;
            created.push(tx.insert_reservation(request.clone()).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn try_delete(&self, batch: &[DeleteReservation]) -> Result<Vec<Reservation>, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut deleted = Vec::with_capacity(batch.len());
        for item in batch {
            let reservation = tx.deactivate_reservation(item.id).await?;
            tx.release_stock(&reservation.key(), reservation.quantity)
                .await?;
            deleted.push(reservation);
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn try_sweep(&self) -> Result<Vec<Reservation>, StoreError> {
        let mut tx = self.store.begin().await?;
        let expired = tx.deactivate_expired(Utc::now()).await?;
        for reservation in &expired {
            tx.release_stock(&reservation.key(), reservation.quantity)
                .await?;
        }
        tx.commit().await?;
        Ok(expired)
    }

    /// Run `attempt` until it succeeds, fails with anything other than a
    /// serialization conflict, or runs out of attempts.
    async fn retrying<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, ReservationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt_no = 1u32;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(StoreError::SerializationConflict(msg))
                    if attempt_no < self.retry.max_attempts =>
                {
                    let delay = self.retry.backoff(attempt_no);
                    warn!(
                        operation,
                        attempt = attempt_no,
                        delay_ms = delay.as_millis() as u64,
                        conflict = %msg,
                        "serialization conflict; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn log_outcome<T>(operation: &'static str, result: &Result<Vec<T>, ReservationError>) {
    match result {
        Ok(items) => info!(operation, items = items.len(), "batch committed"),
        Err(err) if err.kind() == ErrorKind::Transaction => {
            warn!(operation, error = %err, "batch failed")
        }
        Err(err) => debug!(operation, error = %err, "batch rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{DateTime, Duration as ChronoDuration};
    use stockhold_inventory::{Product, StockKey, StockQuery, Warehouse};

    use crate::store::{InMemoryWarehouseStore, StoreTransaction};

    async fn stocked(store: &InMemoryWarehouseStore, sku: &str, quantity: u32) -> StockKey {
        let warehouse = store
            .create_warehouse(Warehouse::new(WarehouseId::new(), "warehouse #1"))
            .await
            .unwrap();
        let product = store
            .create_product(Product::new(Sku::parse(sku).unwrap(), "product"))
            .await
            .unwrap();
        let key = StockKey::new(warehouse.id, product.sku);
        store.create_stock(key.clone(), quantity).await.unwrap();
        key
    }

    fn engine(store: &Arc<InMemoryWarehouseStore>) -> ReservationEngine {
        ReservationEngine::new(store.clone())
    }

    fn request(key: &StockKey, quantity: u32) -> ReservationRequest {
        request_due(key, quantity, Utc::now() + ChronoDuration::days(1))
    }

    fn request_due(key: &StockKey, quantity: u32, due_date: DateTime<Utc>) -> ReservationRequest {
        ReservationRequest {
            id: ReservationId::new(),
            warehouse_id: key.warehouse_id,
            product_id: key.product_id.clone(),
            quantity,
            due_date,
        }
    }

    async fn reserved(store: &InMemoryWarehouseStore, key: &StockKey) -> u32 {
        store
            .get_stock(key)
            .await
            .unwrap()
            .unwrap()
            .reserved_quantity()
    }

    #[tokio::test]
    async fn reserve_reject_delete_reserve_again() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 100).await;
        let engine = engine(&store);

        let first = request(&key, 50);
        let created = engine
            .create_reservations(vec![first.clone()])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert!(created[0].is_active);
        assert_eq!(reserved(&store, &key).await, 50);

        let err = engine
            .create_reservations(vec![request(&key, 60)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReservationError::NotEnoughQuantity {
                sku: key.product_id.clone(),
                warehouse_id: key.warehouse_id,
                requested: 60,
                available: 50,
            }
        );
        assert_eq!(err.kind(), ErrorKind::Capacity);

        engine
            .delete_reservations(vec![DeleteReservation { id: first.id }])
            .await
            .unwrap();
        assert_eq!(reserved(&store, &key).await, 0);

        engine
            .create_reservations(vec![request(&key, 60)])
            .await
            .unwrap();
        assert_eq!(reserved(&store, &key).await, 60);
    }

    #[tokio::test]
    async fn failing_item_rolls_back_whole_batch() {
        let store = InMemoryWarehouseStore::arc();
        let a = stocked(&store, "A", 10).await;
        let b = stocked(&store, "B", 10).await;
        let engine = engine(&store);

        let first = request(&a, 5);
        let missing = StockKey::new(WarehouseId::new(), a.product_id.clone());
        let err = engine
            .create_reservations(vec![first.clone(), request(&missing, 1), request(&b, 5)])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(reserved(&store, &a).await, 0);
        assert_eq!(reserved(&store, &b).await, 0);
        assert!(store.get_reservation(first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_item_rejects_batch_before_store() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 10).await;
        let engine = engine(&store);

        let mut bad = request(&key, 1);
        bad.quantity = 0;
        let err = engine
            .create_reservations(vec![request(&key, 1), bad])
            .await
            .unwrap_err();
        assert_eq!(err, ReservationError::Validation(ValidationError::InvalidQuantity));
        assert_eq!(reserved(&store, &key).await, 0);

        let past = request_due(&key, 1, Utc::now() - ChronoDuration::seconds(1));
        assert_eq!(
            engine.create_reservations(vec![past]).await,
            Err(ReservationError::Validation(ValidationError::IncorrectDueDate))
        );
        assert_eq!(
            engine.create_reservations(Vec::new()).await,
            Err(ReservationError::Validation(ValidationError::EmptyBatch))
        );
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 10).await;
        let engine = engine(&store);

        let req = request(&key, 2);
        engine.create_reservations(vec![req.clone()]).await.unwrap();
        let err = engine.create_reservations(vec![req.clone()]).await.unwrap_err();

        assert_eq!(err, ReservationError::DuplicateReservation { id: req.id });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(reserved(&store, &key).await, 2);
    }

    #[tokio::test]
    async fn delete_of_unknown_reservation_rolls_back_batch() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 10).await;
        let engine = engine(&store);

        let req = request(&key, 4);
        engine.create_reservations(vec![req.clone()]).await.unwrap();

        let unknown = ReservationId::new();
        let err = engine
            .delete_reservations(vec![
                DeleteReservation { id: req.id },
                DeleteReservation { id: unknown },
            ])
            .await
            .unwrap_err();
        assert_eq!(err, ReservationError::ReservationNotFound { id: unknown });
        assert_eq!(reserved(&store, &key).await, 4);
        assert!(store.get_reservation(req.id).await.unwrap().unwrap().is_active);

        engine
            .delete_reservations(vec![DeleteReservation { id: req.id }])
            .await
            .unwrap();
        assert_eq!(
            engine
                .delete_reservations(vec![DeleteReservation { id: req.id }])
                .await,
            Err(ReservationError::ReservationNotFound { id: req.id })
        );
    }

    #[tokio::test]
    async fn delete_rejects_nil_id() {
        let store = InMemoryWarehouseStore::arc();
        let engine = engine(&store);
        let nil = ReservationId::from_uuid(uuid::Uuid::nil());
        assert_eq!(
            engine
                .delete_reservations(vec![DeleteReservation { id: nil }])
                .await,
            Err(ReservationError::Validation(ValidationError::InvalidId))
        );
    }

    #[tokio::test]
    async fn concurrent_creates_never_oversell() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 10).await;
        let engine = engine(&store);

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let engine = engine.clone();
                let req = request(&key, 1);
                tokio::spawn(async move { engine.create_reservations(vec![req]).await })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::Capacity),
            }
        }

        assert_eq!(succeeded, 10);
        let stock = store.get_stock(&key).await.unwrap().unwrap();
        assert_eq!(stock.reserved_quantity(), 10);
        assert!(stock.reserved_quantity() <= stock.quantity());
    }

    #[tokio::test]
    async fn deleting_everything_restores_reserved_quantity() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 100).await;
        let engine = engine(&store);

        let batch: Vec<_> = [5, 10, 15].iter().map(|q| request(&key, *q)).collect();
        let ids: Vec<_> = batch.iter().map(|r| DeleteReservation { id: r.id }).collect();
        engine.create_reservations(batch).await.unwrap();
        assert_eq!(reserved(&store, &key).await, 30);

        engine.delete_reservations(ids).await.unwrap();
        assert_eq!(reserved(&store, &key).await, 0);
    }

    #[tokio::test]
    async fn expired_reservation_is_released_by_next_create() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 10).await;
        let engine = engine(&store);

        let short = request_due(&key, 10, Utc::now() + ChronoDuration::milliseconds(100));
        engine.create_reservations(vec![short.clone()]).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        engine
            .create_reservations(vec![request(&key, 10)])
            .await
            .unwrap();
        assert_eq!(reserved(&store, &key).await, 10);
        assert!(!store.get_reservation(short.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = InMemoryWarehouseStore::arc();
        let key = stocked(&store, "A", 10).await;
        let engine = engine(&store);

        let short = request_due(&key, 3, Utc::now() + ChronoDuration::milliseconds(50));
        engine.create_reservations(vec![short.clone()]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        let released = engine.sweep_expired().await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, short.id);
        assert!(engine.sweep_expired().await.unwrap().is_empty());
        assert_eq!(reserved(&store, &key).await, 0);
    }

    #[tokio::test]
    async fn warehouse_listing_is_pinned() {
        let store = InMemoryWarehouseStore::arc();
        let a = stocked(&store, "A", 1).await;
        stocked(&store, "B", 2).await;
        let engine = engine(&store);

        let all = engine.get_stocks(&GetParams::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let pinned = engine
            .get_warehouse_stocks(a.warehouse_id, &GetParams::default())
            .await
            .unwrap();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].key(), a);

        let again = engine.get_stocks(&GetParams::default()).await.unwrap();
        assert_eq!(all, again);
    }

    #[test]
    fn backoff_ceiling_doubles_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.ceiling(1), Duration::from_millis(20));
        assert_eq!(policy.ceiling(2), Duration::from_millis(40));
        assert_eq!(policy.ceiling(3), Duration::from_millis(80));
        assert_eq!(policy.ceiling(4), Duration::from_millis(100));
        assert_eq!(policy.ceiling(40), Duration::from_millis(100));
    }

    #[test]
    fn backoff_is_jittered_below_the_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        };

        let delays: Vec<_> = (0..32).map(|_| policy.backoff(2)).collect();
        for delay in &delays {
            assert!(*delay >= Duration::from_millis(100), "{delay:?}");
            assert!(*delay <= Duration::from_millis(200), "{delay:?}");
        }
        assert!(delays.iter().any(|d| *d != delays[0]));
    }

    #[test]
    fn default_budget_outlasts_a_burst_of_winners() {
        // One conflict per committed winner: ten racers for ten units must
        // still leave every loser an attempt that sees the final stock.
        let policy = RetryPolicy::default();
        assert!(policy.max_attempts > 10);
        assert!(policy.ceiling(policy.max_attempts) <= policy.max_backoff);
    }

    /// Store whose `begin` loses a serialization race a set number of times.
    struct ConflictingStore {
        inner: InMemoryWarehouseStore,
        conflicts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl WarehouseStore for ConflictingStore {
        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::SerializationConflict("40001".to_string()));
            }
            self.inner.begin().await
        }

        async fn get_stocks(&self, query: &StockQuery) -> Result<Vec<Stock>, StoreError> {
            self.inner.get_stocks(query).await
        }

        async fn get_stock(&self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
            self.inner.get_stock(key).await
        }

        async fn get_reservation(
            &self,
            id: ReservationId,
        ) -> Result<Option<Reservation>, StoreError> {
            self.inner.get_reservation(id).await
        }

        async fn create_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse, StoreError> {
            self.inner.create_warehouse(warehouse).await
        }

        async fn create_product(&self, product: Product) -> Result<Product, StoreError> {
            self.inner.create_product(product).await
        }

        async fn create_stock(&self, key: StockKey, quantity: u32) -> Result<Stock, StoreError> {
            self.inner.create_stock(key, quantity).await
        }

        async fn truncate(&self) -> Result<(), StoreError> {
            self.inner.truncate().await
        }
    }

    #[tokio::test]
    async fn serialization_conflicts_are_retried_then_surface() {
        let inner = InMemoryWarehouseStore::new();
        let key = stocked(&inner, "A", 10).await;
        let store = Arc::new(ConflictingStore {
            inner,
            conflicts: AtomicU32::new(0),
        });
        let engine = ReservationEngine::new(store.clone()).with_retry(RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        });

        let req = request(&key, 2);
        engine.create_reservations(vec![req.clone()]).await.unwrap();

        store.conflicts.store(2, Ordering::SeqCst);
        engine
            .delete_reservations(vec![DeleteReservation { id: req.id }])
            .await
            .unwrap();
        assert_eq!(store.get_stock(&key).await.unwrap().unwrap().reserved_quantity(), 0);

        store.conflicts.store(3, Ordering::SeqCst);
        let err = engine.sweep_expired().await.unwrap_err();
        assert!(matches!(err, ReservationError::SerializationConflict(_)));
        assert_eq!(err.kind(), ErrorKind::Transaction);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig {
            cases: 64,
            ..proptest::prelude::ProptestConfig::default()
        })]

        /// Property: a batch commits exactly when its total fits the free
        /// quantity, and deleting every committed reservation returns the
        /// reserved pool to zero.
        #[test]
        fn batches_are_all_or_nothing_and_conserve_quantity(
            capacity in 0u32..50,
            batches in proptest::collection::vec(proptest::collection::vec(1u32..20, 1..4), 1..10)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = InMemoryWarehouseStore::arc();
                let key = stocked(&store, "A", capacity).await;
                let engine = engine(&store);

                let mut expected = 0u32;
                let mut committed = Vec::new();
                for quantities in &batches {
                    let batch: Vec<_> = quantities.iter().map(|q| request(&key, *q)).collect();
                    let ids: Vec<_> = batch.iter().map(|r| DeleteReservation { id: r.id }).collect();
                    let total: u32 = quantities.iter().sum();

                    let result = engine.create_reservations(batch).await;
                    proptest::prop_assert_eq!(result.is_ok(), expected + total <= capacity);
                    if result.is_ok() {
                        expected += total;
                        committed.extend(ids);
                    }
                    proptest::prop_assert_eq!(reserved(&store, &key).await, expected);
                }

                if !committed.is_empty() {
                    engine.delete_reservations(committed).await.unwrap();
                }
                proptest::prop_assert_eq!(reserved(&store, &key).await, 0);
                Ok::<(), proptest::test_runner::TestCaseError>(())
            })?;
        }
    }

    #[test]
    fn store_errors_keep_their_meaning() {
        let key = StockKey::new(WarehouseId::new(), Sku::parse("A").unwrap());
        assert_eq!(
            ReservationError::from(StoreError::StockNotFound { key: key.clone() }).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ReservationError::from(StoreError::Database("boom".to_string())).kind(),
            ErrorKind::Transaction
        );
        assert_eq!(
            ReservationError::from(StoreError::Invariant("bad".to_string())).kind(),
            ErrorKind::Transaction
        );
    }
}
