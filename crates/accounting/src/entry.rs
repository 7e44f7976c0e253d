use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{AccountId, Decimal, TransactionId};

/// Which recording path produced a ledger row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    /// Written together with the balance change it describes.
    BalanceChange,
    /// Recorded for a balance change applied outside this engine.
    External,
}

impl EntryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryOrigin::BalanceChange => "balance_change",
            EntryOrigin::External => "external",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "balance_change" => Some(EntryOrigin::BalanceChange),
            "external" => Some(EntryOrigin::External),
            _ => None,
        }
    }
}

/// A ledger row ready to be inserted (id and timestamp not yet assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub transaction_type: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_number: String,
    pub balance_after: Decimal,
    pub status: String,
    pub origin: EntryOrigin,
}

/// A persisted ledger row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub transaction_type: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_number: String,
    pub transaction_date: DateTime<Utc>,
    pub balance_after: Decimal,
    pub status: String,
    pub origin: EntryOrigin,
}

impl LedgerEntry {
    /// Materialize a row from its insert shape plus the store-assigned columns.
    pub fn from_new(id: TransactionId, transaction_date: DateTime<Utc>, new: NewLedgerEntry) -> Self {
        Self {
            id,
            account_id: new.account_id,
            transaction_type: new.transaction_type,
            amount: new.amount,
            description: new.description,
            reference_number: new.reference_number,
            transaction_date,
            balance_after: new.balance_after,
            status: new.status,
            origin: new.origin,
        }
    }
}
