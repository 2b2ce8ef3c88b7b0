use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::ledger::{LedgerEntry, LedgerEntryId, NewLedgerEntry};
use crate::domain::ports::{BalancePlan, BalanceStore, CommitError, LedgerLog};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

type AccountMap = HashMap<AccountId, Balance>;

/// A thread-safe in-memory balance store.
///
/// Uses `Arc<RwLock<HashMap<AccountId, Balance>>>` for shared concurrent access.
/// A write transaction holds the write lock for its whole lifetime, which makes
/// every transaction serializable with respect to all others.
#[derive(Default, Clone)]
pub struct InMemoryBalanceStore {
    accounts: Arc<RwLock<AccountMap>>,
}

/// Exclusive write scope over an [`InMemoryBalanceStore`].
///
/// Writes are staged and only reach the map on [`commit`](Self::commit).
/// Dropping the transaction discards them.
pub struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<AccountMap>,
    staged: AccountMap,
}

impl InMemoryTransaction {
    pub fn get(&self, id: &AccountId) -> Option<Balance> {
        self.staged
            .get(id)
            .or_else(|| self.guard.get(id))
            .copied()
    }

    pub fn put(&mut self, id: AccountId, balance: Balance) {
        self.staged.insert(id, balance);
    }

    pub fn commit(mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.guard.extend(staged);
    }
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a write transaction, waiting for any other one to finish.
    pub async fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            guard: self.accounts.clone().write_owned().await,
            staged: HashMap::new(),
        }
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.contains_key(id))
    }

    async fn read(&self, id: &AccountId) -> Result<Option<Balance>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).copied())
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        accounts.insert(account.id.clone(), account.balance);
        Ok(())
    }

    async fn write_many(
        &self,
        ids: &[AccountId],
        plan: BalancePlan,
    ) -> Result<Vec<Balance>, CommitError> {
        let mut txn = self.begin().await;

        let current = ids
            .iter()
            .map(|id| {
                txn.get(id)
                    .ok_or_else(|| StoreError::NotFound(format!("account {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let next = plan(current.as_slice()).map_err(CommitError::Rejected)?;
        if next.len() != ids.len() {
            return Err(StoreError::internal(format!(
                "balance plan returned {} balances for {} accounts",
                next.len(),
                ids.len()
            ))
            .into());
        }

        for (id, balance) in ids.iter().zip(&next) {
            txn.put(id.clone(), *balance);
        }
        txn.commit();

        Ok(next)
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts
            .iter()
            .map(|(id, balance)| Account::new(id.clone(), *balance))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// A thread-safe in-memory ledger log.
///
/// Entry ids are positions in the backing vector, starting at 1.
#[derive(Default, Clone)]
pub struct InMemoryLedgerLog {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedgerLog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot(id: LedgerEntryId) -> Option<usize> {
    usize::try_from(id.0).ok()?.checked_sub(1)
}

#[async_trait]
impl LedgerLog for InMemoryLedgerLog {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntryId, StoreError> {
        let mut entries = self.entries.write().await;
        let next = i64::try_from(entries.len() + 1)
            .map_err(|_| StoreError::internal("ledger id space exhausted"))?;
        let id = LedgerEntryId(next);
        entries.push(LedgerEntry::from_new(id, entry, Utc::now()));
        Ok(id)
    }

    async fn attach_failure_message(
        &self,
        id: LedgerEntryId,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let entry = slot(id)
            .and_then(|i| entries.get_mut(i))
            .ok_or_else(|| StoreError::NotFound(format!("ledger entry {id}")))?;
        entry.annotate(message);
        Ok(())
    }

    async fn get(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(slot(id).and_then(|i| entries.get(i)).cloned())
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }
}
