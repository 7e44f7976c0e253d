use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use ledger_accounting::{Account, LedgerEntry, NewLedgerEntry};
use ledger_core::{AccountId, AccountNumber, Decimal};

/// Ledger store operation error.
///
/// These are **infrastructure errors** (connectivity, constraints, decoding) as
/// opposed to business rejections, which never travel through this type.
///
/// ## Error Categories
///
/// - **Unavailable**: store unreachable, pool exhausted or closed, IO failure
/// - **Timeout**: a statement or the whole unit ran past its budget
/// - **Conflict**: serialization failure or deadlock detected by the store
/// - **UniqueViolation**: a unique constraint rejected a write
/// - **Constraint**: any other integrity constraint rejected a write
/// - **Decode**: a stored row could not be mapped back into domain types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether the same request could succeed if sent again.
    ///
    /// A retry is only safe when the caller can rule out a duplicate effect.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::Conflict(_)
        )
    }
}

/// Durable home of accounts and their ledger rows.
///
/// ## Design Principles
///
/// - **Explicit dependency**: engines receive a store at construction time; no
///   process-wide handle exists
/// - **Units of work**: every write happens inside a [`LedgerUnit`] obtained from
///   [`LedgerStore::begin`], which commits or rolls back as a whole
/// - **Append-only ledger**: rows can be inserted, never updated or deleted
///
/// Implementations must let units on different accounts run in parallel and
/// serialize units that lock the same account.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start an atomic unit.
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError>;

    /// Read the committed state of an account without locking it.
    async fn account(&self, account_number: &AccountNumber) -> Result<Option<Account>, StoreError>;

    /// Committed ledger rows of an account, oldest first.
    async fn entries_for(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One atomic unit against the store.
///
/// Writes become visible to other readers only after [`LedgerUnit::commit`].
/// Dropping a unit without committing discards everything it wrote and releases
/// its row locks, so an abandoned (cancelled) unit never leaves partial state.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Read an account by number and hold its row lock until the unit ends.
    ///
    /// Returns the account in whatever lifecycle status it has; callers decide
    /// whether the status is acceptable.
    async fn lock_account(&mut self, account_number: &AccountNumber)
    -> Result<Option<Account>, StoreError>;

    /// Overwrite the balance of an account locked by this unit.
    async fn write_balance(&mut self, account_id: AccountId, balance: Decimal) -> Result<(), StoreError>;

    /// Balance-change row already written for `reference_number` on this account, if any.
    async fn find_applied_reference(
        &mut self,
        account_id: AccountId,
        reference_number: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// Append a ledger row; the store assigns its id and timestamp.
    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        (**self).begin().await
    }

    async fn account(&self, account_number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        (**self).account(account_number).await
    }

    async fn entries_for(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for(account_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}
