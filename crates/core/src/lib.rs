//! `ledger-core`: shared building blocks for the balance ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, AccountNumber, TransactionId};
pub use money::{Decimal, ensure_non_zero, format_amount, is_debit};
