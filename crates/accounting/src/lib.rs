//! Accounting module (account balances + append-only ledger rows).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod command;
pub mod entry;
pub mod ledger;

pub use account::{Account, AccountStatus, NewAccount};
pub use command::{ApplyBalanceChange, DEFAULT_STATUS, RecordTransaction};
pub use entry::{EntryOrigin, LedgerEntry, NewLedgerEntry};
pub use ledger::{
    BalanceChangeOutcome, BalanceChangePlan, BalanceChangeReceipt, RecordOutcome, RecordReceipt,
    Rejection, plan_balance_change,
};
