use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use ledger_accounting::{Account, AccountStatus, EntryOrigin, LedgerEntry, NewAccount, NewLedgerEntry};
use ledger_core::{AccountId, AccountNumber, Decimal, TransactionId};

use super::r#trait::{LedgerStore, LedgerUnit, StoreError};

/// Step of a unit at which an injected fault fires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    LockAccount,
    WriteBalance,
    InsertEntry,
    Commit,
}

#[derive(Debug, Default)]
struct Committed {
    accounts: HashMap<AccountId, Account>,
    by_number: HashMap<AccountNumber, AccountId>,
    entries: Vec<LedgerEntry>,
}

#[derive(Debug, Default)]
struct Shared {
    committed: Mutex<Committed>,
    row_locks: Mutex<HashMap<AccountId, Arc<RowLock<()>>>>,
    fault: Mutex<Option<FaultPoint>>,
    next_account_id: AtomicI64,
    next_transaction_id: AtomicI64,
}

impl Shared {
    fn committed(&self) -> Result<MutexGuard<'_, Committed>, StoreError> {
        self.committed
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn row_lock(&self, account_id: AccountId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(locks.entry(account_id).or_default().clone())
    }

    /// Fire the armed fault once if it targets `point`.
    fn trip(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut fault = self
            .fault
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        if *fault == Some(point) {
            *fault = None;
            return Err(StoreError::Unavailable(format!("injected fault at {point:?}")));
        }
        Ok(())
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Row locks are per account, so units on different
/// accounts never wait on each other. A unit stages its writes and applies them
/// in one step at commit; dropping it throws the staged writes away.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut committed = self.shared.committed()?;
        if committed.by_number.contains_key(&new.account_number) {
            return Err(StoreError::UniqueViolation(format!(
                "account {} already exists",
                new.account_number
            )));
        }

        let id = AccountId::new(self.shared.next_account_id.fetch_add(1, Ordering::SeqCst) + 1);
        let account = Account {
            id,
            account_number: new.account_number,
            account_name: new.account_name,
            account_type: new.account_type,
            balance: new.opening_balance,
            currency: new.currency,
            status: AccountStatus::Active,
            updated_at: Utc::now(),
        };
        committed.by_number.insert(account.account_number.clone(), id);
        committed.accounts.insert(id, account.clone());
        Ok(account)
    }

    /// Change an account's lifecycle status, as account-management tooling would.
    pub fn set_status(&self, account_number: &AccountNumber, status: AccountStatus) -> Result<(), StoreError> {
        let mut committed = self.shared.committed()?;
        let id = *committed
            .by_number
            .get(account_number)
            .ok_or_else(|| StoreError::Constraint(format!("unknown account {account_number}")))?;
        if let Some(account) = committed.accounts.get_mut(&id) {
            account.status = status;
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Arm a one-shot fault; the next unit step matching `point` fails with `Unavailable`.
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut fault) = self.shared.fault.lock() {
            *fault = Some(point);
        }
    }

    /// All committed rows, in insertion order.
    pub fn all_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.shared.committed()?.entries.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        self.shared.trip(FaultPoint::Begin)?;
        Ok(Box::new(InMemoryUnit {
            shared: self.shared.clone(),
            held: HashMap::new(),
            balances: HashMap::new(),
            entries: Vec::new(),
        }))
    }

    async fn account(&self, account_number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        let committed = self.shared.committed()?;
        Ok(committed
            .by_number
            .get(account_number)
            .and_then(|id| committed.accounts.get(id))
            .cloned())
    }

    async fn entries_for(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let committed = self.shared.committed()?;
        Ok(committed
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.shared.committed().map(|_| ())
    }
}

struct InMemoryUnit {
    shared: Arc<Shared>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    balances: HashMap<AccountId, Decimal>,
    entries: Vec<LedgerEntry>,
}

impl InMemoryUnit {
    fn ensure_held(&self, account_id: AccountId) -> Result<(), StoreError> {
        if self.held.contains_key(&account_id) {
            Ok(())
        } else {
            Err(StoreError::Constraint(format!(
                "account {account_id} is not locked by this unit"
            )))
        }
    }
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
    async fn lock_account(
        &mut self,
        account_number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        self.shared.trip(FaultPoint::LockAccount)?;

        let id = match self.shared.committed()?.by_number.get(account_number) {
            Some(id) => *id,
            None => return Ok(None),
        };

        if !self.held.contains_key(&id) {
            let lock = self.shared.row_lock(id)?;
            let guard = lock.lock_owned().await;
            self.held.insert(id, guard);
        }

        // Read after the lock is held so the balance reflects every earlier commit.
        let mut account = match self.shared.committed()?.accounts.get(&id) {
            Some(account) => account.clone(),
            None => return Ok(None),
        };
        if let Some(staged) = self.balances.get(&id) {
            account.balance = *staged;
        }
        Ok(Some(account))
    }

    async fn write_balance(&mut self, account_id: AccountId, balance: Decimal) -> Result<(), StoreError> {
        self.shared.trip(FaultPoint::WriteBalance)?;
        self.ensure_held(account_id)?;
        self.balances.insert(account_id, balance);
        Ok(())
    }

    async fn find_applied_reference(
        &mut self,
        account_id: AccountId,
        reference_number: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let applied = |e: &&LedgerEntry| {
            e.account_id == account_id
                && e.origin == EntryOrigin::BalanceChange
                && e.reference_number == reference_number
        };
        if let Some(staged) = self.entries.iter().find(applied) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.shared.committed()?.entries.iter().find(applied).cloned())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        self.shared.trip(FaultPoint::InsertEntry)?;

        if !self.shared.committed()?.accounts.contains_key(&entry.account_id) {
            return Err(StoreError::Constraint(format!(
                "transactions.account_id {} has no matching account",
                entry.account_id
            )));
        }
        if entry.origin == EntryOrigin::BalanceChange
            && self
                .find_applied_reference(entry.account_id, &entry.reference_number)
                .await?
                .is_some()
        {
            return Err(StoreError::UniqueViolation(format!(
                "reference {} already applied to account {}",
                entry.reference_number, entry.account_id
            )));
        }

        let id = TransactionId::new(self.shared.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = LedgerEntry::from_new(id, Utc::now(), entry);
        self.entries.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.shared.trip(FaultPoint::Commit)?;

        let InMemoryUnit {
            shared,
            held,
            balances,
            entries,
        } = *self;

        {
            let mut committed = shared.committed()?;
            let now = Utc::now();
            for (id, balance) in balances {
                if let Some(account) = committed.accounts.get_mut(&id) {
                    account.balance = balance;
                    account.updated_at = now;
                }
            }
            committed.entries.extend(entries);
        }

        // Row locks are released only once the writes are visible.
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
