//! Requests accepted by the balance engine.
//!
//! Both commands validate their own shape before any store access; a failed
//! `validate()` means the request never reaches the ledger.

use serde::{Deserialize, Serialize};

use ledger_core::{AccountNumber, Decimal, DomainError, DomainResult, ensure_non_zero};

/// Status written on ledger rows when the caller does not say otherwise.
pub const DEFAULT_STATUS: &str = "completed";

/// Debit or credit an account and record the matching ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyBalanceChange {
    pub account_number: AccountNumber,
    /// Positive = credit, negative = debit.
    pub amount: Decimal,
    pub transaction_type: String,
    pub reference_number: String,
    pub description: String,
}

impl ApplyBalanceChange {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_non_zero(self.amount)?;
        require_text("transactionType", &self.transaction_type)?;
        require_text("referenceNumber", &self.reference_number)?;
        require_text("description", &self.description)?;
        Ok(())
    }
}

/// Record a ledger row for a balance change that was applied elsewhere.
///
/// `balance_after` is asserted by the caller. Only trusted internal callers
/// should be able to issue this command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub account_number: AccountNumber,
    pub transaction_type: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_number: String,
    pub balance_after: Decimal,
    pub status: Option<String>,
}

impl RecordTransaction {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_non_zero(self.amount)?;
        require_text("transactionType", &self.transaction_type)?;
        require_text("referenceNumber", &self.reference_number)?;
        require_text("description", &self.description)?;
        if let Some(status) = &self.status {
            require_text("status", status)?;
        }
        Ok(())
    }

    pub fn status_or_default(&self) -> &str {
        self.status.as_deref().unwrap_or(DEFAULT_STATUS)
    }
}

fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn change(amount: Decimal) -> ApplyBalanceChange {
        ApplyBalanceChange {
            account_number: AccountNumber::parse("ACC-1").unwrap(),
            amount,
            transaction_type: "DEBIT".to_string(),
            reference_number: "REF-1".to_string(),
            description: "bill payment".to_string(),
        }
    }

    #[test]
    fn well_formed_change_passes() {
        assert!(change(dec!(-10.00)).validate().is_ok());
    }

    #[test]
    fn zero_amount_is_a_validation_error() {
        assert!(matches!(
            change(dec!(0.00)).validate(),
            Err(DomainError::Validation(msg)) if msg.contains("amount")
        ));
    }

    #[test]
    fn blank_reference_is_a_validation_error() {
        let mut cmd = change(dec!(5));
        cmd.reference_number = "  ".to_string();
        assert!(matches!(
            cmd.validate(),
            Err(DomainError::Validation(msg)) if msg.contains("referenceNumber")
        ));
    }

    #[test]
    fn record_status_defaults_to_completed() {
        let mut cmd = RecordTransaction {
            account_number: AccountNumber::parse("ACC-1").unwrap(),
            transaction_type: "DEBIT".to_string(),
            amount: dec!(-20),
            description: "card".to_string(),
            reference_number: "TXN-9".to_string(),
            balance_after: dec!(80),
            status: None,
        };
        assert_eq!(cmd.status_or_default(), "completed");

        cmd.status = Some("pending".to_string());
        assert_eq!(cmd.status_or_default(), "pending");

        cmd.status = Some(String::new());
        assert!(cmd.validate().is_err());
    }
}
