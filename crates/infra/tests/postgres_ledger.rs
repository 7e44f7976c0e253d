//! Ledger properties against a real Postgres.
//!
//! Runs only when `DATABASE_URL` points at a database the tests may write to;
//! otherwise every test returns early.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;

use ledger_accounting::{
    AccountStatus, ApplyBalanceChange, BalanceChangeOutcome, EntryOrigin, NewAccount, NewLedgerEntry,
    RecordOutcome, RecordTransaction, Rejection,
};
use ledger_core::{AccountNumber, Decimal};
use ledger_infra::store::schema;
use ledger_infra::{LedgerEngine, LedgerError, LedgerStore, LedgerUnit, PostgresLedgerStore};

static NEXT: AtomicU32 = AtomicU32::new(0);

async fn setup(opening: Decimal) -> Option<(Arc<LedgerEngine<PostgresLedgerStore>>, PostgresLedgerStore, AccountNumber)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    schema::migrate(&pool).await.expect("migrate");

    let store = PostgresLedgerStore::new(pool);
    let number = AccountNumber::parse(&format!(
        "PGT-{}-{}",
        Utc::now().timestamp_micros(),
        NEXT.fetch_add(1, Ordering::SeqCst)
    ))
    .unwrap();
    store
        .open_account(NewAccount::new(number.clone(), opening))
        .await
        .expect("open account");

    Some((Arc::new(LedgerEngine::new(store.clone())), store, number))
}

fn change(account_number: &AccountNumber, amount: Decimal, reference: &str) -> ApplyBalanceChange {
    ApplyBalanceChange {
        account_number: account_number.clone(),
        amount,
        transaction_type: if amount < Decimal::ZERO { "DEBIT" } else { "CREDIT" }.to_string(),
        reference_number: reference.to_string(),
        description: "postgres test".to_string(),
    }
}

async fn snapshot(store: &PostgresLedgerStore, number: &AccountNumber) -> (Decimal, usize) {
    let account = store.account(number).await.unwrap().unwrap();
    let rows = store.entries_for(account.id).await.unwrap();
    (account.balance, rows.len())
}

#[tokio::test]
async fn sufficiency_boundary_holds() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };

    let rejected = engine
        .apply_balance_change(change(&number, dec!(-100.01), "PAY-1"))
        .await
        .unwrap();
    assert!(matches!(
        rejected,
        BalanceChangeOutcome::Rejected(Rejection::InsufficientFunds { .. })
    ));

    let applied = engine
        .apply_balance_change(change(&number, dec!(-100.00), "PAY-2"))
        .await
        .unwrap();
    assert!(applied.is_applied());
    assert_eq!(snapshot(&store, &number).await, (dec!(0.00), 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn row_lock_serializes_concurrent_debits() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };

    let a = tokio::spawn({
        let (engine, number) = (engine.clone(), number.clone());
        async move { engine.apply_balance_change(change(&number, dec!(-60.00), "PAY-A")).await }
    });
    let b = tokio::spawn({
        let (engine, number) = (engine.clone(), number.clone());
        async move { engine.apply_balance_change(change(&number, dec!(-60.00), "PAY-B")).await }
    });

    let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
    assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 1);
    assert_eq!(snapshot(&store, &number).await, (dec!(40.00), 1));
}

#[tokio::test]
async fn duplicate_reference_is_rejected() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };

    engine
        .apply_balance_change(change(&number, dec!(-10.00), "PAY-1"))
        .await
        .unwrap();
    let retry = engine
        .apply_balance_change(change(&number, dec!(-10.00), "PAY-1"))
        .await
        .unwrap();
    assert!(matches!(
        retry,
        BalanceChangeOutcome::Rejected(Rejection::DuplicateReference { .. })
    ));
    assert_eq!(snapshot(&store, &number).await, (dec!(90.00), 1));
}

#[tokio::test]
async fn record_keeps_balance_and_verifies_balance_after() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };

    let record = |balance_after: Decimal| RecordTransaction {
        account_number: number.clone(),
        transaction_type: "DEBIT".to_string(),
        amount: dec!(-5.00),
        description: "card".to_string(),
        reference_number: "CARD-1".to_string(),
        balance_after,
        status: None,
    };

    let err = engine.record_transaction(record(dec!(95.00))).await.unwrap_err();
    assert!(matches!(err, LedgerError::InconsistentState { .. }));

    let outcome = engine.record_transaction(record(dec!(100.00))).await.unwrap();
    assert!(matches!(outcome, RecordOutcome::Recorded(_)));
    assert_eq!(snapshot(&store, &number).await, (dec!(100.00), 1));
}

#[tokio::test]
async fn ledger_rows_cannot_be_rewritten() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };

    engine
        .apply_balance_change(change(&number, dec!(-1.00), "PAY-1"))
        .await
        .unwrap();
    let account = store.account(&number).await.unwrap().unwrap();

    let update = sqlx::query("UPDATE transactions SET amount = 0 WHERE account_id = $1")
        .bind(account.id.get())
        .execute(store.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM transactions WHERE account_id = $1")
        .bind(account.id.get())
        .execute(store.pool())
        .await;
    assert!(delete.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newest_row_carries_balance_when_units_begin_out_of_order() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };

    // Begins first, writes last.
    let mut late = store.begin().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let applied = engine
        .apply_balance_change(change(&number, dec!(-10.00), "PAY-A"))
        .await
        .unwrap();
    assert!(applied.is_applied());

    let account = late.lock_account(&number).await.unwrap().unwrap();
    let balance_after = account.balance + dec!(-5.00);
    late.write_balance(account.id, balance_after).await.unwrap();
    late.insert_entry(NewLedgerEntry {
        account_id: account.id,
        transaction_type: "DEBIT".to_string(),
        amount: dec!(-5.00),
        description: "postgres test".to_string(),
        reference_number: "PAY-B".to_string(),
        balance_after,
        status: "completed".to_string(),
        origin: EntryOrigin::BalanceChange,
    })
    .await
    .unwrap();
    late.commit().await.unwrap();

    let account = store.account(&number).await.unwrap().unwrap();
    let rows = store.entries_for(account.id).await.unwrap();
    let references: Vec<&str> = rows.iter().map(|r| r.reference_number.as_str()).collect();
    assert_eq!(references, ["PAY-A", "PAY-B"]);
    assert_eq!(account.balance, dec!(85.00));
    assert_eq!(rows.last().unwrap().balance_after, account.balance);
    assert!(rows
        .windows(2)
        .all(|pair| pair[0].transaction_date <= pair[1].transaction_date));
}

#[tokio::test]
async fn inactive_account_takes_records_but_not_balance_changes() {
    let Some((engine, store, number)) = setup(dec!(100.00)).await else {
        return;
    };
    store.set_status(&number, AccountStatus::Inactive).await.unwrap();

    let rejected = engine
        .apply_balance_change(change(&number, dec!(-1.00), "PAY-1"))
        .await
        .unwrap();
    assert!(matches!(
        rejected,
        BalanceChangeOutcome::Rejected(Rejection::AccountNotFound { .. })
    ));

    let recorded = engine
        .record_transaction(RecordTransaction {
            account_number: number.clone(),
            transaction_type: "DEBIT".to_string(),
            amount: dec!(-1.00),
            description: "card".to_string(),
            reference_number: "CARD-1".to_string(),
            balance_after: dec!(100.00),
            status: None,
        })
        .await
        .unwrap();
    assert!(matches!(recorded, RecordOutcome::Recorded(_)));
    assert_eq!(snapshot(&store, &number).await, (dec!(100.00), 1));
}
