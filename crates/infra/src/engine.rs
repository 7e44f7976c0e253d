//! Balance engine (application-level orchestration).
//!
//! The engine turns the two ledger commands into store units:
//!
//! ```text
//! ApplyBalanceChange
//!   ↓
//! 1. Validate the request (no store access on failure)
//!   ↓
//! 2. Begin a unit and lock the account row
//!   ↓
//! 3. Reject missing/inactive accounts and already applied references
//!   ↓
//! 4. Plan the change (pure decision logic, sufficiency check)
//!   ↓
//! 5. Write the new balance and its ledger row, then commit
//! ```
//!
//! `RecordTransaction` follows the same shape but never writes the balance.
//!
//! ## Error Semantics
//!
//! - **Rejections** (`BalanceChangeOutcome::Rejected`, `RecordOutcome::Rejected`) are
//!   normal results: the unit was rolled back and nothing changed
//! - **Validation**: malformed request, the store was not touched
//! - **InconsistentState**: a recorded `balanceAfter` disagrees with the stored balance
//! - **Store**: infrastructure failure; the unit was rolled back, or, for a failure
//!   during commit, the outcome is unknown and a retry answers `DuplicateReference`
//!   if the first attempt did land
//!
//! Every unit runs under a time budget. When it expires the in-flight unit is
//! dropped, which rolls it back and releases the row lock.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use ledger_accounting::{
    ApplyBalanceChange, BalanceChangeOutcome, BalanceChangeReceipt, EntryOrigin, NewLedgerEntry,
    RecordOutcome, RecordReceipt, RecordTransaction, Rejection, plan_balance_change,
};
use ledger_core::{AccountNumber, Decimal, DomainError};

use crate::store::{LedgerStore, LedgerUnit, StoreError};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed request (deterministic, never retry).
    #[error("validation failed: {0}")]
    Validation(DomainError),

    /// Supplied `balanceAfter` does not match the stored balance.
    #[error(
        "balanceAfter {supplied} does not match stored balance {stored} for account {account_number}"
    )]
    InconsistentState {
        account_number: AccountNumber,
        supplied: Decimal,
        stored: Decimal,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store(e) => e.is_transient(),
            LedgerError::Validation(_) | LedgerError::InconsistentState { .. } => false,
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        LedgerError::Validation(value)
    }
}

/// How `record_transaction` treats a caller-supplied `balanceAfter`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum BalanceAfterPolicy {
    /// Must equal the stored balance at record time.
    #[default]
    Verified,
    /// Inserted as supplied. Only for trusted internal callers.
    Trusted,
}

impl BalanceAfterPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceAfterPolicy::Verified => "verified",
            BalanceAfterPolicy::Trusted => "trusted",
        }
    }
}

impl FromStr for BalanceAfterPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verified" => Ok(BalanceAfterPolicy::Verified),
            "trusted" => Ok(BalanceAfterPolicy::Trusted),
            other => Err(DomainError::validation(format!(
                "unknown balanceAfter policy '{other}' (expected verified or trusted)"
            ))),
        }
    }
}

/// Executes ledger commands against an injected store.
///
/// The store is the only shared state; an engine is cheap to clone when `S` is
/// (e.g. `Arc<dyn LedgerStore>`), and concurrent calls are serialized per account
/// by the store's row locks.
#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
    operation_timeout: Duration,
    balance_after_policy: BalanceAfterPolicy,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            balance_after_policy: BalanceAfterPolicy::default(),
        }
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn with_balance_after_policy(mut self, policy: BalanceAfterPolicy) -> Self {
        self.balance_after_policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn balance_after_policy(&self) -> BalanceAfterPolicy {
        self.balance_after_policy
    }
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore,
{
    /// Debit or credit an account and write the matching ledger row in one unit.
    pub async fn apply_balance_change(
        &self,
        cmd: ApplyBalanceChange,
    ) -> Result<BalanceChangeOutcome, LedgerError> {
        self.apply_balance_change_within(cmd, self.operation_timeout).await
    }

    #[instrument(
        skip(self, cmd),
        fields(
            account_number = %cmd.account_number,
            reference_number = %cmd.reference_number,
            amount = %cmd.amount
        )
    )]
    pub async fn apply_balance_change_within(
        &self,
        cmd: ApplyBalanceChange,
        budget: Duration,
    ) -> Result<BalanceChangeOutcome, LedgerError> {
        cmd.validate()?;

        let result = match tokio::time::timeout(budget, self.run_balance_change(&cmd)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!("balance change exceeded {budget:?}")).into()),
        };

        match &result {
            Ok(BalanceChangeOutcome::Applied(receipt)) => info!(
                old_balance = %receipt.old_balance,
                new_balance = %receipt.new_balance,
                transaction_id = %receipt.transaction_id,
                "balance change applied"
            ),
            Ok(BalanceChangeOutcome::Rejected(rejection)) => warn!(
                reason = rejection.reason_code(),
                "balance change rejected: {}",
                rejection.message()
            ),
            Err(e) => error!(error = %e, retryable = e.is_retryable(), "balance change failed"),
        }
        result
    }

    async fn run_balance_change(
        &self,
        cmd: &ApplyBalanceChange,
    ) -> Result<BalanceChangeOutcome, LedgerError> {
        let mut unit = self.store.begin().await?;

        let account = match unit.lock_account(&cmd.account_number).await? {
            Some(account) if account.is_active() => account,
            _ => {
                return reject(
                    unit,
                    Rejection::AccountNotFound {
                        account_number: cmd.account_number.clone(),
                    },
                )
                .await
                .map(BalanceChangeOutcome::Rejected);
            }
        };

        if let Some(applied) = unit
            .find_applied_reference(account.id, &cmd.reference_number)
            .await?
        {
            return reject(
                unit,
                Rejection::DuplicateReference {
                    account_number: cmd.account_number.clone(),
                    reference_number: cmd.reference_number.clone(),
                    transaction_id: applied.id,
                    balance_after: applied.balance_after,
                },
            )
            .await
            .map(BalanceChangeOutcome::Rejected);
        }

        let plan = match plan_balance_change(&account, cmd) {
            Ok(plan) => plan,
            Err(rejection) => {
                return reject(unit, rejection)
                    .await
                    .map(BalanceChangeOutcome::Rejected);
            }
        };

        unit.write_balance(account.id, plan.new_balance).await?;
        let entry = unit.insert_entry(plan.entry).await?;
        unit.commit().await?;

        Ok(BalanceChangeOutcome::Applied(BalanceChangeReceipt {
            account_number: account.account_number,
            old_balance: plan.old_balance,
            new_balance: plan.new_balance,
            transaction_id: entry.id,
        }))
    }

    /// Record a ledger row for a balance change applied elsewhere.
    ///
    /// The account balance is never touched.
    pub async fn record_transaction(
        &self,
        cmd: RecordTransaction,
    ) -> Result<RecordOutcome, LedgerError> {
        self.record_transaction_within(cmd, self.operation_timeout).await
    }

    #[instrument(
        skip(self, cmd),
        fields(
            account_number = %cmd.account_number,
            reference_number = %cmd.reference_number,
            policy = self.balance_after_policy.as_str()
        )
    )]
    pub async fn record_transaction_within(
        &self,
        cmd: RecordTransaction,
        budget: Duration,
    ) -> Result<RecordOutcome, LedgerError> {
        cmd.validate()?;

        let result = match tokio::time::timeout(budget, self.run_record(&cmd)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!("record exceeded {budget:?}")).into()),
        };

        match &result {
            Ok(RecordOutcome::Recorded(receipt)) => {
                info!(transaction_id = %receipt.transaction_id, "transaction recorded")
            }
            Ok(RecordOutcome::Rejected(rejection)) => warn!(
                reason = rejection.reason_code(),
                "record rejected: {}",
                rejection.message()
            ),
            Err(e @ LedgerError::InconsistentState { .. }) => warn!(error = %e, "record refused"),
            Err(e) => error!(error = %e, retryable = e.is_retryable(), "record failed"),
        }
        result
    }

    async fn run_record(&self, cmd: &RecordTransaction) -> Result<RecordOutcome, LedgerError> {
        let mut unit = self.store.begin().await?;

        // Any lifecycle status: the effect already happened elsewhere.
        let Some(account) = unit.lock_account(&cmd.account_number).await? else {
            return reject(
                unit,
                Rejection::AccountNotFound {
                    account_number: cmd.account_number.clone(),
                },
            )
            .await
            .map(RecordOutcome::Rejected);
        };

        if self.balance_after_policy == BalanceAfterPolicy::Verified
            && cmd.balance_after != account.balance
        {
            unit.rollback().await?;
            return Err(LedgerError::InconsistentState {
                account_number: account.account_number,
                supplied: cmd.balance_after,
                stored: account.balance,
            });
        }

        let entry = unit
            .insert_entry(NewLedgerEntry {
                account_id: account.id,
                transaction_type: cmd.transaction_type.clone(),
                amount: cmd.amount,
                description: cmd.description.clone(),
                reference_number: cmd.reference_number.clone(),
                balance_after: cmd.balance_after,
                status: cmd.status_or_default().to_string(),
                origin: EntryOrigin::External,
            })
            .await?;
        unit.commit().await?;

        Ok(RecordOutcome::Recorded(RecordReceipt {
            transaction_id: entry.id,
            account_number: account.account_number,
        }))
    }
}

async fn reject(unit: Box<dyn LedgerUnit>, rejection: Rejection) -> Result<Rejection, LedgerError> {
    unit.rollback().await?;
    Ok(rejection)
}
