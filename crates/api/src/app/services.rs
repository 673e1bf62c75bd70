//! Service wiring: one storage backend shared by every service.

use std::sync::Arc;

use anyhow::Context;

use stockledger_infra::store::{InMemoryStore, LedgerBackend, PostgresStore};
use stockledger_infra::{
    AppConfig, CatalogService, ExportService, ManualAdjustmentGateway, MovementQueryService,
    OrderLifecycleAdapter, OrderService, ReconciliationEngine, StorageConfig,
};

/// Backend chosen at startup (in-memory or Postgres).
pub type Backend = Arc<dyn LedgerBackend>;

pub struct AppServices {
    pub catalog: CatalogService<Backend>,
    pub orders: OrderService<Backend, Backend>,
    pub adjustments: ManualAdjustmentGateway<Backend>,
    pub movements: MovementQueryService<Backend, Backend>,
    pub exports: ExportService<Backend>,
}

impl AppServices {
    pub fn new(backend: Backend, config: &AppConfig) -> Self {
        let engine = Arc::new(ReconciliationEngine::new(backend.clone(), config.retry));
        Self {
            catalog: CatalogService::new(backend.clone(), config.low_stock_threshold),
            orders: OrderService::new(backend.clone(), OrderLifecycleAdapter::new(engine.clone())),
            adjustments: ManualAdjustmentGateway::new(engine),
            movements: MovementQueryService::new(backend.clone(), backend.clone()),
            exports: ExportService::new(backend, config.export_default_tz, config.export_batch_size),
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let backend: Backend = match &config.storage {
        StorageConfig::InMemory => {
            tracing::info!("using in-memory stores");
            Arc::new(InMemoryStore::new())
        }
        StorageConfig::Postgres {
            database_url,
            max_connections,
        } => {
            tracing::info!(max_connections, "using postgres stores");
            let store = PostgresStore::connect(database_url, *max_connections)
                .await
                .context("failed to connect to postgres")?;
            Arc::new(store)
        }
    };
    Ok(AppServices::new(backend, config))
}
