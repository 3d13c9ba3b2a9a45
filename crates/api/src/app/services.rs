use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use stockhold_infra::{
    Config, InMemoryWarehouseStore, PostgresWarehouseStore, ReservationEngine, WarehouseStore,
};

/// Everything a handler needs, shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub engine: ReservationEngine,
}

impl AppServices {
    pub fn new(engine: ReservationEngine) -> Self {
        Self { engine }
    }

    /// Services over a fresh in-memory store (tests/dev).
    pub fn in_memory() -> Self {
        Self::new(ReservationEngine::new(InMemoryWarehouseStore::arc()))
    }

    pub fn store(&self) -> &Arc<dyn WarehouseStore> {
        self.engine.store()
    }
}

/// Pick the store from `config` and wire the engine on top of it.
///
/// With a database URL the schema is applied before the store is handed out.
pub async fn build_services(config: &Config) -> anyhow::Result<AppServices> {
    let store: Arc<dyn WarehouseStore> = match &config.database {
        Some(database) => {
            let store = PostgresWarehouseStore::connect(database)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply database schema")?;
            info!(max_connections = database.max_connections, "using postgres store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store");
            InMemoryWarehouseStore::arc()
        }
    };

    Ok(AppServices::new(
        ReservationEngine::new(store).with_retry(config.retry),
    ))
}
