//! Postgres-backed ledger store.
//!
//! Each [`LedgerUnit`] wraps one database transaction. The account row is read
//! with `SELECT ... FOR UPDATE`, so units touching the same account serialize on
//! the row lock while units on other accounts proceed in parallel. Row ids and
//! `transaction_date` are both assigned while that lock is held, so id order is
//! write order for an account.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `23505` | `UniqueViolation` | Reference already applied, duplicate account number |
//! | Database | `23503`, `23502`, `23514` | `Constraint` | Missing account, null column, CHECK failure |
//! | Database | `40001`, `40P01` | `Conflict` | Serialization failure or deadlock |
//! | Database | `57014` | `Timeout` | `statement_timeout` cancelled the query |
//! | Database | Any other | `Constraint` | Append-only trigger and other rejected writes |
//! | PoolTimedOut | N/A | `Timeout` | No connection within the acquire timeout |
//! | PoolClosed, Io, Tls | N/A | `Unavailable` | Store unreachable |
//! | ColumnDecode, Decode | N/A | `Decode` | Stored value does not fit the domain type |
//!
//! ## Thread Safety
//!
//! `PostgresLedgerStore` is `Send + Sync` and cheap to clone; it shares one pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{Span, instrument};

use ledger_accounting::{Account, AccountStatus, EntryOrigin, LedgerEntry, NewAccount, NewLedgerEntry};
use ledger_core::{AccountId, AccountNumber, Decimal, TransactionId};

use super::r#trait::{LedgerStore, LedgerUnit, StoreError};

const ACCOUNT_COLUMNS: &str =
    "id, account_number, account_name, account_type, balance, currency, status, updated_at";

const ENTRY_COLUMNS: &str = "id, account_id, transaction_type, amount, description, reference_number, \
     transaction_date, balance_after, status, origin";

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert an active account row.
    ///
    /// Used by account-management tooling and fixtures; the engine never opens accounts.
    #[instrument(skip(self, new), fields(account_number = %new.account_number), err)]
    pub async fn open_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            "INSERT INTO accounts (account_number, account_name, account_type, balance, currency, status) \
             VALUES ($1, $2, $3, $4, $5, 'active') \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new.account_number.as_str())
            .bind(&new.account_name)
            .bind(&new.account_type)
            .bind(new.opening_balance)
            .bind(&new.currency)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("open_account", e))?;

        decode_account(&row)
    }

    #[instrument(skip(self), fields(account_number = %account_number), err)]
    pub async fn set_status(
        &self,
        account_number: &AccountNumber,
        status: AccountStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET status = $2, updated_at = NOW() WHERE account_number = $1",
        )
        .bind(account_number.as_str())
        .bind(status.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!("unknown account {account_number}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgUnit { tx: Some(tx) }))
    }

    #[instrument(skip(self), fields(account_number = %account_number), err)]
    async fn account(&self, account_number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1");
        let row = sqlx::query(&sql)
            .bind(account_number.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_account", e))?;

        row.as_ref().map(decode_account).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id, entry_count = tracing::field::Empty), err)]
    async fn entries_for(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM transactions WHERE account_id = $1 \
             ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_entries", e))?;

        let entries = rows.iter().map(decode_entry).collect::<Result<Vec<_>, _>>()?;
        Span::current().record("entry_count", entries.len());
        Ok(entries)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

/// One database transaction.
///
/// Dropping it without `commit` lets sqlx roll the transaction back when the
/// connection returns to the pool.
struct PgUnit {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnit {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("transaction already finished".to_string()))
    }
}

#[async_trait]
impl LedgerUnit for PgUnit {
    async fn lock_account(
        &mut self,
        account_number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1 FOR UPDATE"
        );
        let tx = self.tx()?;
        let row = sqlx::query(&sql)
            .bind(account_number.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_account", e))?;

        row.as_ref().map(decode_account).transpose()
    }

    async fn write_balance(&mut self, account_id: AccountId, balance: Decimal) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query("UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(account_id.get())
            .bind(balance)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("write_balance", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Constraint(format!(
                "balance update touched {} rows for account {account_id}",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn find_applied_reference(
        &mut self,
        account_id: AccountId,
        reference_number: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM transactions \
             WHERE account_id = $1 AND reference_number = $2 AND origin = 'balance_change' \
             LIMIT 1"
        );
        let tx = self.tx()?;
        let row = sqlx::query(&sql)
            .bind(account_id.get())
            .bind(reference_number)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("find_applied_reference", e))?;

        row.as_ref().map(decode_entry).transpose()
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (
                account_id,
                transaction_type,
                amount,
                description,
                reference_number,
                balance_after,
                status,
                origin,
                transaction_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, clock_timestamp())
            RETURNING id, transaction_date
            "#,
        )
        .bind(entry.account_id.get())
        .bind(&entry.transaction_type)
        .bind(entry.amount)
        .bind(&entry.description)
        .bind(&entry.reference_number)
        .bind(entry.balance_after)
        .bind(&entry.status)
        .bind(entry.origin.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;

        let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("insert_entry", e))?;
        let transaction_date: DateTime<Utc> = row
            .try_get("transaction_date")
            .map_err(|e| map_sqlx_error("insert_entry", e))?;

        Ok(LedgerEntry::from_new(TransactionId::new(id), transaction_date, entry))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx
                .commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e)),
            None => Err(StoreError::Unavailable("transaction already finished".to_string())),
        }
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e)),
            None => Ok(()),
        }
    }
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    account_number: String,
    account_name: String,
    account_type: String,
    balance: Decimal,
    currency: String,
    status: String,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            account_number: row.try_get("account_number")?,
            account_name: row.try_get("account_name")?,
            account_type: row.try_get("account_type")?,
            balance: row.try_get("balance")?,
            currency: row.try_get("currency")?,
            status: row.try_get("status")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let account_number = AccountNumber::parse(&row.account_number)
            .map_err(|e| StoreError::Decode(format!("accounts.account_number: {e}")))?;
        Ok(Account {
            id: AccountId::new(row.id),
            account_number,
            account_name: row.account_name,
            account_type: row.account_type,
            balance: row.balance,
            currency: row.currency,
            status: AccountStatus::parse(&row.status),
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct EntryRow {
    id: i64,
    account_id: i64,
    transaction_type: String,
    amount: Decimal,
    description: String,
    reference_number: String,
    transaction_date: DateTime<Utc>,
    balance_after: Decimal,
    status: String,
    origin: String,
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            transaction_type: row.try_get("transaction_type")?,
            amount: row.try_get("amount")?,
            description: row.try_get("description")?,
            reference_number: row.try_get("reference_number")?,
            transaction_date: row.try_get("transaction_date")?,
            balance_after: row.try_get("balance_after")?,
            status: row.try_get("status")?,
            origin: row.try_get("origin")?,
        })
    }
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let origin = EntryOrigin::parse(&row.origin)
            .ok_or_else(|| StoreError::Decode(format!("transactions.origin: unknown value '{}'", row.origin)))?;
        Ok(LedgerEntry {
            id: TransactionId::new(row.id),
            account_id: AccountId::new(row.account_id),
            transaction_type: row.transaction_type,
            amount: row.amount,
            description: row.description,
            reference_number: row.reference_number,
            transaction_date: row.transaction_date,
            balance_after: row.balance_after,
            status: row.status,
            origin,
        })
    }
}

fn decode_account(row: &PgRow) -> Result<Account, StoreError> {
    AccountRow::from_row(row)
        .map_err(|e| StoreError::Decode(format!("failed to deserialize account row: {e}")))?
        .try_into()
}

fn decode_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    EntryRow::from_row(row)
        .map_err(|e| StoreError::Decode(format!("failed to deserialize transaction row: {e}")))?
        .try_into()
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("23503" | "23502" | "23514") => StoreError::Constraint(msg),
                Some("40001" | "40P01") => StoreError::Conflict(msg),
                Some("57014") => StoreError::Timeout(msg),
                _ => StoreError::Constraint(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("no connection available in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        err @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_)) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_transient() {
        assert!(map_sqlx_error("begin", sqlx::Error::PoolClosed).is_transient());
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolTimedOut),
            StoreError::Timeout(_)
        ));
    }

    #[test]
    fn decode_failures_are_not_transient() {
        let err = map_sqlx_error("load_account", sqlx::Error::ColumnNotFound("balance".to_string()));
        assert!(matches!(err, StoreError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn unknown_origin_fails_to_decode() {
        let row = EntryRow {
            id: 1,
            account_id: 1,
            transaction_type: "DEBIT".to_string(),
            amount: Decimal::NEGATIVE_ONE,
            description: "x".to_string(),
            reference_number: "R".to_string(),
            transaction_date: Utc::now(),
            balance_after: Decimal::ZERO,
            status: "completed".to_string(),
            origin: "manual".to_string(),
        };
        assert!(matches!(LedgerEntry::try_from(row), Err(StoreError::Decode(_))));
    }
}
