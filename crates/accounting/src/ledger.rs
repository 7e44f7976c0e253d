//! Balance-change decisions and their outcomes.
//!
//! `plan_balance_change` is the pure half of a balance mutation: given the
//! account as read under its row lock, it decides whether the change is allowed
//! and which row must be written. The store-facing half lives in the engine.

use serde::{Deserialize, Serialize};

use ledger_core::{AccountNumber, Decimal, TransactionId, format_amount, is_debit};

use crate::account::Account;
use crate::command::{ApplyBalanceChange, DEFAULT_STATUS};
use crate::entry::{EntryOrigin, NewLedgerEntry};

/// Expected negative outcome of a well-formed request.
///
/// Rejections are normal results, not faults: nothing was written and the
/// caller gets a reason it can show to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    AccountNotFound {
        account_number: AccountNumber,
    },
    InsufficientFunds {
        account_number: AccountNumber,
        balance: Decimal,
        requested: Decimal,
    },
    /// The reference already produced a balance change on this account.
    ///
    /// The earlier change stands: `transaction_id` and `balance_after` describe
    /// the row it wrote, so a retrying caller can treat this as already applied.
    DuplicateReference {
        account_number: AccountNumber,
        reference_number: String,
        transaction_id: TransactionId,
        balance_after: Decimal,
    },
}

impl Rejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Rejection::AccountNotFound { .. } => "account_not_found",
            Rejection::InsufficientFunds { .. } => "insufficient_funds",
            Rejection::DuplicateReference { .. } => "duplicate_reference",
        }
    }

    pub fn account_number(&self) -> &AccountNumber {
        match self {
            Rejection::AccountNotFound { account_number }
            | Rejection::InsufficientFunds { account_number, .. }
            | Rejection::DuplicateReference { account_number, .. } => account_number,
        }
    }

    /// Balance seen before the request was turned down, where one was read.
    pub fn observed_balance(&self) -> Option<Decimal> {
        match self {
            Rejection::AccountNotFound { .. } => None,
            Rejection::InsufficientFunds { balance, .. } => Some(*balance),
            Rejection::DuplicateReference { balance_after, .. } => Some(*balance_after),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Rejection::AccountNotFound { account_number } => {
                format!("Account {account_number} not found or inactive")
            }
            Rejection::InsufficientFunds {
                balance, requested, ..
            } => format!(
                "Insufficient funds: balance {} cannot cover {}",
                format_amount(*balance),
                format_amount(requested.abs())
            ),
            Rejection::DuplicateReference {
                reference_number,
                transaction_id,
                ..
            } => format!(
                "Reference {reference_number} was already applied as transaction {transaction_id}"
            ),
        }
    }
}

/// What an accepted balance change will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChangePlan {
    pub old_balance: Decimal,
    pub new_balance: Decimal,
    pub entry: NewLedgerEntry,
}

/// Decide a balance change against the account state read under lock.
pub fn plan_balance_change(
    account: &Account,
    cmd: &ApplyBalanceChange,
) -> Result<BalanceChangePlan, Rejection> {
    if !account.is_active() {
        return Err(Rejection::AccountNotFound {
            account_number: cmd.account_number.clone(),
        });
    }

    let old_balance = account.balance;
    let new_balance = old_balance + cmd.amount;

    // Credits are never rejected for sufficiency.
    if is_debit(cmd.amount) && new_balance < Decimal::ZERO {
        return Err(Rejection::InsufficientFunds {
            account_number: cmd.account_number.clone(),
            balance: old_balance,
            requested: cmd.amount,
        });
    }

    Ok(BalanceChangePlan {
        old_balance,
        new_balance,
        entry: NewLedgerEntry {
            account_id: account.id,
            transaction_type: cmd.transaction_type.clone(),
            amount: cmd.amount,
            description: cmd.description.clone(),
            reference_number: cmd.reference_number.clone(),
            balance_after: new_balance,
            status: DEFAULT_STATUS.to_string(),
            origin: EntryOrigin::BalanceChange,
        },
    })
}

/// Success result of a balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChangeReceipt {
    pub account_number: AccountNumber,
    pub old_balance: Decimal,
    pub new_balance: Decimal,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceChangeOutcome {
    Applied(BalanceChangeReceipt),
    Rejected(Rejection),
}

impl BalanceChangeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, BalanceChangeOutcome::Applied(_))
    }
}

/// Success result of recording an externally effected transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub transaction_id: TransactionId,
    pub account_number: AccountNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Recorded(RecordReceipt),
    Rejected(Rejection),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use chrono::Utc;
    use ledger_core::AccountId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_account(balance: Decimal) -> Account {
        Account {
            id: AccountId::new(7),
            account_number: AccountNumber::parse("ACC-7").unwrap(),
            account_name: "Primary Savings".to_string(),
            account_type: "savings".to_string(),
            balance,
            currency: "INR".to_string(),
            status: AccountStatus::Active,
            updated_at: Utc::now(),
        }
    }

    fn change(amount: Decimal) -> ApplyBalanceChange {
        ApplyBalanceChange {
            account_number: AccountNumber::parse("ACC-7").unwrap(),
            amount,
            transaction_type: if amount.is_sign_negative() { "DEBIT" } else { "CREDIT" }.to_string(),
            reference_number: "REF-1".to_string(),
            description: "test".to_string(),
        }
    }

    #[test]
    fn debit_to_exactly_zero_is_allowed() {
        let plan = plan_balance_change(&test_account(dec!(100.00)), &change(dec!(-100.00))).unwrap();
        assert_eq!(plan.old_balance, dec!(100.00));
        assert_eq!(plan.new_balance, dec!(0.00));
        assert_eq!(plan.entry.balance_after, dec!(0.00));
        assert_eq!(plan.entry.status, "completed");
        assert_eq!(plan.entry.origin, EntryOrigin::BalanceChange);
    }

    #[test]
    fn debit_one_cent_past_zero_is_rejected() {
        let rejection =
            plan_balance_change(&test_account(dec!(100.00)), &change(dec!(-100.01))).unwrap_err();
        assert_eq!(rejection.reason_code(), "insufficient_funds");
        assert_eq!(rejection.observed_balance(), Some(dec!(100.00)));
        assert!(rejection.message().contains("100.00"));
    }

    #[test]
    fn credit_on_empty_account_is_allowed() {
        let plan = plan_balance_change(&test_account(dec!(0.00)), &change(dec!(25.50))).unwrap();
        assert_eq!(plan.new_balance, dec!(25.50));
    }

    #[test]
    fn credit_is_not_checked_for_sufficiency() {
        // A negative balance can only arrive through external tooling, but a
        // credit must still go through.
        let plan = plan_balance_change(&test_account(dec!(-50.00)), &change(dec!(10.00))).unwrap();
        assert_eq!(plan.new_balance, dec!(-40.00));
    }

    #[test]
    fn inactive_account_reads_as_not_found() {
        let mut account = test_account(dec!(100));
        account.status = AccountStatus::Inactive;
        let rejection = plan_balance_change(&account, &change(dec!(5))).unwrap_err();
        assert_eq!(rejection.reason_code(), "account_not_found");
        assert_eq!(rejection.observed_balance(), None);
    }

    #[test]
    fn rejection_serializes_with_reason_tag() {
        let rejection = Rejection::AccountNotFound {
            account_number: AccountNumber::parse("does-not-exist").unwrap(),
        };
        let json = serde_json::to_value(&rejection).unwrap();
        assert_eq!(json["reason"], "account_not_found");
        assert_eq!(json["account_number"], "does-not-exist");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying any sequence of accepted plans keeps the balance
        /// non-negative and every row's balance_after equal to the running balance.
        #[test]
        fn accepted_plans_never_overdraw(
            amounts in prop::collection::vec(-50_000i64..50_000i64, 1..40)
        ) {
            let mut account = test_account(dec!(0));
            for cents in amounts {
                if cents == 0 {
                    continue;
                }
                let amount = Decimal::new(cents, 2);
                match plan_balance_change(&account, &change(amount)) {
                    Ok(plan) => {
                        prop_assert_eq!(plan.old_balance, account.balance);
                        prop_assert_eq!(plan.entry.balance_after, plan.new_balance);
                        account.balance = plan.new_balance;
                    }
                    Err(Rejection::InsufficientFunds { balance, .. }) => {
                        prop_assert!(amount < Decimal::ZERO);
                        prop_assert!(balance + amount < Decimal::ZERO);
                    }
                    Err(other) => prop_assert!(false, "unexpected rejection {other:?}"),
                }
                prop_assert!(account.balance >= Decimal::ZERO);
            }
        }
    }
}
