use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{AccountId, AccountNumber, Decimal};

/// Lifecycle status of an account.
///
/// Only `Active` accounts accept balance changes. Statuses written by other
/// account-management tooling that this crate does not know about are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
    Other(String),
}

impl AccountStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Closed => "closed",
            AccountStatus::Other(s) => s.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "active" => AccountStatus::Active,
            "inactive" => AccountStatus::Inactive,
            "closed" => AccountStatus::Closed,
            _ => AccountStatus::Other(raw.to_string()),
        }
    }
}

impl From<String> for AccountStatus {
    fn from(value: String) -> Self {
        AccountStatus::parse(&value)
    }
}

impl From<AccountStatus> for String {
    fn from(value: AccountStatus) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of an account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_number: AccountNumber,
    pub account_name: String,
    pub account_type: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Shape used by account-management tooling and test fixtures to open an account.
///
/// Opening accounts is not part of the balance engine itself; stores expose it
/// so that fixtures and admin tooling have a single way to seed rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub account_number: AccountNumber,
    pub account_name: String,
    pub account_type: String,
    pub opening_balance: Decimal,
    pub currency: String,
}

impl NewAccount {
    pub fn new(account_number: AccountNumber, opening_balance: Decimal) -> Self {
        Self {
            account_name: format!("Account {account_number}"),
            account_number,
            account_type: "savings".to_string(),
            opening_balance,
            currency: "INR".to_string(),
        }
    }
}
