#![allow(dead_code)]

use async_trait::async_trait;
use ledgerline::application::accounts::AccountService;
use ledgerline::application::transfer::TransferEngine;
use ledgerline::config::EngineConfig;
use ledgerline::domain::account::{Account, AccountId, Balance};
use ledgerline::domain::ledger::{LedgerEntry, LedgerEntryId, NewLedgerEntry};
use ledgerline::domain::ports::{BalancePlan, BalanceStore, CommitError, LedgerLog};
use ledgerline::error::StoreError;
use ledgerline::infrastructure::in_memory::{InMemoryBalanceStore, InMemoryLedgerLog};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn id(s: &str) -> AccountId {
    AccountId::new(s).unwrap()
}

/// Balance store that delegates to the in-memory store unless told to fail.
#[derive(Clone, Default)]
pub struct FaultyBalanceStore {
    pub inner: InMemoryBalanceStore,
    fail_exists: Arc<Mutex<HashSet<AccountId>>>,
    fail_read: Arc<Mutex<HashSet<AccountId>>>,
    fail_commit: Arc<AtomicBool>,
}

impl FaultyBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_exists_for(&self, id: &AccountId) {
        self.fail_exists.lock().unwrap().insert(id.clone());
    }

    pub fn fail_read_for(&self, id: &AccountId) {
        self.fail_read.lock().unwrap().insert(id.clone());
    }

    /// Makes `write_many` stage the first row and then fail before committing.
    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BalanceStore for FaultyBalanceStore {
    async fn exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        if self.fail_exists.lock().unwrap().contains(id) {
            return Err(StoreError::internal("connection reset"));
        }
        self.inner.exists(id).await
    }

    async fn read(&self, id: &AccountId) -> Result<Option<Balance>, StoreError> {
        if self.fail_read.lock().unwrap().contains(id) {
            return Err(StoreError::internal("connection reset"));
        }
        self.inner.read(id).await
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert(account).await
    }

    async fn write_many(
        &self,
        ids: &[AccountId],
        plan: BalancePlan,
    ) -> Result<Vec<Balance>, CommitError> {
        if !self.fail_commit.load(Ordering::SeqCst) {
            return self.inner.write_many(ids, plan).await;
        }

        let mut txn = self.inner.begin().await;
        let current = ids
            .iter()
            .map(|id| txn.get(id).unwrap_or_default())
            .collect::<Vec<_>>();
        let next = plan(current.as_slice()).map_err(CommitError::Rejected)?;
        // first leg written, second never reached
        txn.put(ids[0].clone(), next[0]);
        Err(StoreError::internal("could not serialize access due to concurrent update").into())
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.inner.accounts().await
    }
}

/// Ledger log that delegates to the in-memory log unless told to fail.
#[derive(Clone, Default)]
pub struct FaultyLedgerLog {
    pub inner: InMemoryLedgerLog,
    fail_append: Arc<AtomicBool>,
    fail_attach: Arc<AtomicBool>,
}

impl FaultyLedgerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerLog for FaultyLedgerLog {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntryId, StoreError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(StoreError::internal("ledger unavailable"));
        }
        self.inner.append(entry).await
    }

    async fn attach_failure_message(
        &self,
        id: LedgerEntryId,
        message: &str,
    ) -> Result<(), StoreError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(StoreError::internal("ledger unavailable"));
        }
        self.inner.attach_failure_message(id, message).await
    }

    async fn get(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        self.inner.get(id).await
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.entries().await
    }
}

/// Builds an engine over the given doubles and opens `balances`.
pub async fn engine_with(
    store: FaultyBalanceStore,
    ledger: FaultyLedgerLog,
    balances: &[(&str, Decimal)],
) -> TransferEngine {
    let accounts = AccountService::new(Arc::new(store), EngineConfig::default());
    for (name, balance) in balances {
        accounts.create_account(id(name), *balance).await.unwrap();
    }
    TransferEngine::new(accounts, Arc::new(ledger))
}

/// An engine over plain in-memory storage.
pub async fn in_memory_engine(balances: &[(&str, Decimal)]) -> (TransferEngine, InMemoryLedgerLog) {
    let ledger = InMemoryLedgerLog::new();
    let accounts = AccountService::new(
        Arc::new(InMemoryBalanceStore::new()),
        EngineConfig::default(),
    );
    for (name, balance) in balances {
        accounts.create_account(id(name), *balance).await.unwrap();
    }
    (
        TransferEngine::new(accounts, Arc::new(ledger.clone())),
        ledger,
    )
}

pub async fn balance_of(engine: &TransferEngine, name: &str) -> Balance {
    engine.accounts().get_account(&id(name)).await.unwrap().balance
}
