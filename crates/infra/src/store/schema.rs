//! Ledger schema.
//!
//! `migrate` is idempotent and safe to run from several processes at once: the
//! statements run in one transaction behind a transaction-scoped advisory lock.

use sqlx::PgPool;
use tracing::{info, instrument};

use super::postgres::map_sqlx_error;
use super::r#trait::StoreError;

/// Advisory lock key shared by every process migrating the ledger schema.
const MIGRATION_LOCK_KEY: i64 = 0x4c45_4447_4552;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id              BIGSERIAL PRIMARY KEY,
        account_number  TEXT NOT NULL UNIQUE,
        account_name    TEXT NOT NULL,
        account_type    TEXT NOT NULL,
        balance         NUMERIC NOT NULL DEFAULT 0,
        currency        TEXT NOT NULL DEFAULT 'INR',
        status          TEXT NOT NULL DEFAULT 'active',
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id                BIGSERIAL PRIMARY KEY,
        account_id        BIGINT NOT NULL REFERENCES accounts (id),
        transaction_type  TEXT NOT NULL,
        amount            NUMERIC NOT NULL,
        description       TEXT NOT NULL,
        reference_number  TEXT NOT NULL,
        transaction_date  TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
        balance_after     NUMERIC NOT NULL,
        status            TEXT NOT NULL DEFAULT 'completed',
        origin            TEXT NOT NULL CHECK (origin IN ('balance_change', 'external'))
    )
    "#,
    // Stamped at insert under the row lock, not at BEGIN.
    r#"
    ALTER TABLE transactions ALTER COLUMN transaction_date SET DEFAULT clock_timestamp()
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_account_date_idx
        ON transactions (account_id, transaction_date)
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS transactions_applied_reference_idx
        ON transactions (account_id, reference_number)
        WHERE origin = 'balance_change'
    "#,
    r#"
    CREATE OR REPLACE FUNCTION transactions_append_only() RETURNS trigger AS $$
    BEGIN
        RAISE EXCEPTION 'transactions is append-only: % rejected', TG_OP;
    END;
    $$ LANGUAGE plpgsql
    "#,
    r#"DROP TRIGGER IF EXISTS transactions_append_only ON transactions"#,
    r#"
    CREATE TRIGGER transactions_append_only
        BEFORE UPDATE OR DELETE ON transactions
        FOR EACH ROW EXECUTE FUNCTION transactions_append_only()
    "#,
];

/// Create or bring up to date the `accounts` and `transactions` tables.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_migration", e))?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("migration_lock", e))?;

    for statement in STATEMENTS {
        sqlx::query(*statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_migration", e))?;

    info!(statements = STATEMENTS.len(), "ledger schema is up to date");
    Ok(())
}
