//! Ledger store boundary.
//!
//! Accounts and their append-only ledger rows live behind [`LedgerStore`]. Every
//! write goes through a [`LedgerUnit`], so a balance update and the row that
//! describes it commit together or not at all.

pub mod in_memory;
pub mod postgres;
pub mod schema;
pub mod r#trait;

pub use in_memory::{FaultPoint, InMemoryLedgerStore};
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, LedgerUnit, StoreError};
