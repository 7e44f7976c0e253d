//! Infrastructure layer: ledger stores, the balance engine, config.

pub mod config;
pub mod engine;
pub mod store;


pub use config::{ConfigError, DatabaseConfig, LedgerConfig, StoreBackend};
pub use engine::{BalanceAfterPolicy, LedgerEngine, LedgerError};
pub use store::{
    FaultPoint, InMemoryLedgerStore, LedgerStore, LedgerUnit, PostgresLedgerStore, StoreError,
};
