use std::sync::Arc;

use tracing::{info, warn};

use ledger_infra::store::schema;
use ledger_infra::{
    InMemoryLedgerStore, LedgerConfig, LedgerEngine, LedgerStore, PostgresLedgerStore, StoreBackend,
};

/// Type-erased store so one `AppServices` covers every backend.
pub type SharedStore = Arc<dyn LedgerStore>;

pub type SharedEngine = LedgerEngine<SharedStore>;

#[derive(Clone)]
pub struct AppServices {
    engine: Arc<SharedEngine>,
}

impl AppServices {
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn store(&self) -> &SharedStore {
        self.engine.store()
    }
}

/// Wire the store selected by `config` into an engine.
///
/// For Postgres this also brings the schema up to date.
pub async fn build_services(config: &LedgerConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match config.store {
        StoreBackend::Postgres => {
            let pool = config.database.connect_pool()?;
            schema::migrate(&pool).await?;
            info!(max_connections = config.database.max_connections, "using postgres ledger store");
            Arc::new(PostgresLedgerStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("using in-memory ledger store; balances are lost on restart");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let engine = LedgerEngine::new(store)
        .with_operation_timeout(config.operation_timeout)
        .with_balance_after_policy(config.balance_after_policy);
    info!(
        balance_after_policy = engine.balance_after_policy().as_str(),
        operation_timeout_ms = config.operation_timeout.as_millis() as u64,
        "ledger engine ready"
    );
    Ok(AppServices::new(engine))
}
