use serde::{Deserialize, Serialize};

use ledger_accounting::{
    ApplyBalanceChange, BalanceChangeReceipt, RecordReceipt, RecordTransaction, Rejection,
};
use ledger_core::{AccountNumber, Decimal, DomainError, DomainResult, TransactionId};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /internal/accounts/update-balance`.
///
/// Missing text fields deserialize as empty and are reported by validation, so
/// every malformed request gets the same 400 shape. Amounts are read from the
/// JSON number's digits, never through `f64`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBalanceRequest {
    #[serde(default)]
    pub account_number: String,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision_option")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub reference_number: String,
    #[serde(default)]
    pub description: String,
}

impl UpdateBalanceRequest {
    pub fn into_command(self) -> DomainResult<ApplyBalanceChange> {
        Ok(ApplyBalanceChange {
            account_number: AccountNumber::parse(&self.account_number)?,
            amount: require_amount("amount", self.amount)?,
            transaction_type: self.transaction_type,
            reference_number: self.reference_number,
            description: self.description,
        })
    }
}

/// Body of `POST /internal/accounts/transactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransactionRequest {
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision_option")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reference_number: String,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision_option")]
    pub balance_after: Option<Decimal>,
    pub status: Option<String>,
}

impl RecordTransactionRequest {
    pub fn into_command(self) -> DomainResult<RecordTransaction> {
        Ok(RecordTransaction {
            account_number: AccountNumber::parse(&self.account_number)?,
            transaction_type: self.transaction_type,
            amount: require_amount("amount", self.amount)?,
            description: self.description,
            reference_number: self.reference_number,
            balance_after: require_amount("balanceAfter", self.balance_after)?,
            status: self.status,
        })
    }
}

fn require_amount(field: &str, value: Option<Decimal>) -> DomainResult<Decimal> {
    value.ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBalanceResponse {
    pub success: bool,
    pub account_number: AccountNumber,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub old_balance: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub new_balance: Decimal,
    pub transaction_id: TransactionId,
}

impl From<BalanceChangeReceipt> for UpdateBalanceResponse {
    fn from(receipt: BalanceChangeReceipt) -> Self {
        Self {
            success: true,
            account_number: receipt.account_number,
            old_balance: receipt.old_balance,
            new_balance: receipt.new_balance,
            transaction_id: receipt.transaction_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransactionResponse {
    pub success: bool,
    pub transaction_id: TransactionId,
    pub account_number: AccountNumber,
}

impl From<RecordReceipt> for RecordTransactionResponse {
    fn from(receipt: RecordReceipt) -> Self {
        Self {
            success: true,
            transaction_id: receipt.transaction_id,
            account_number: receipt.account_number,
        }
    }
}

/// Negative business outcome (`success: false`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionResponse {
    pub success: bool,
    pub reason: &'static str,
    pub account_number: AccountNumber,
    #[serde(
        with = "rust_decimal::serde::arbitrary_precision_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub old_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub message: String,
}

impl From<&Rejection> for RejectionResponse {
    fn from(rejection: &Rejection) -> Self {
        let transaction_id = match rejection {
            Rejection::DuplicateReference { transaction_id, .. } => Some(*transaction_id),
            _ => None,
        };
        Self {
            success: false,
            reason: rejection.reason_code(),
            account_number: rejection.account_number().clone(),
            old_balance: rejection.observed_balance(),
            transaction_id,
            message: rejection.message(),
        }
    }
}
