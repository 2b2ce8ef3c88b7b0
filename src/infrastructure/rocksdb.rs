use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::ledger::{LedgerEntry, LedgerEntryId, NewLedgerEntry};
use crate::domain::ports::{BalancePlan, BalanceStore, CommitError, LedgerLog};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing account balances.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing ledger entries, keyed by big-endian id.
pub const CF_LEDGER: &str = "ledger";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const LEDGER_SEQ_KEY: &[u8] = b"ledger_seq";

/// A persistent store implementation using RocksDB.
///
/// Serves as both the balance store and the ledger log, using separate Column
/// Families. Backed by a pessimistic `TransactionDB`: multi-row writes lock
/// their keys with `get_for_update_cf` and commit as one unit.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("accounts", "ledger" and
    /// "meta") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_ACCOUNTS, CF_LEDGER, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            cfs,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::internal(format!("{name} column family not found")))
    }

    fn decode_seq(bytes: Option<Vec<u8>>) -> Result<i64, StoreError> {
        match bytes {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::internal("corrupt ledger sequence"))?;
                Ok(i64::from_be_bytes(raw))
            }
        }
    }
}

#[async_trait]
impl BalanceStore for RocksDBStore {
    async fn exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        Ok(self.db.get_pinned_cf(cf, id.as_str())?.is_some())
    }

    async fn read(&self, id: &AccountId) -> Result<Option<Balance>, StoreError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, id.as_str())? {
            Some(bytes) => {
                let account: Account = serde_json::from_slice(&bytes)?;
                Ok(Some(account.balance))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let txn = self.db.transaction();
        if txn
            .get_for_update_cf(cf, account.id.as_str(), true)?
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        txn.put_cf(cf, account.id.as_str(), serde_json::to_vec(account)?)?;
        txn.commit()?;
        Ok(())
    }

    async fn write_many(
        &self,
        ids: &[AccountId],
        plan: BalancePlan,
    ) -> Result<Vec<Balance>, CommitError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let txn = self.db.transaction();

        // Lock in id order so two writers over the same rows cannot deadlock.
        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by(|&a, &b| ids[a].cmp(&ids[b]));

        let mut current = vec![Balance::ZERO; ids.len()];
        for i in order {
            let bytes = txn
                .get_for_update_cf(cf, ids[i].as_str(), true)
                .map_err(StoreError::from)?
                .ok_or_else(|| StoreError::NotFound(format!("account {}", ids[i])))?;
            let account: Account = serde_json::from_slice(&bytes).map_err(StoreError::from)?;
            current[i] = account.balance;
        }

        // An early return drops `txn`, which rolls it back.
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
            let value = serde_json::to_vec(&Account::new(id.clone(), *balance))
                .map_err(StoreError::from)?;
            txn.put_cf(cf, id.as_str(), value)
                .map_err(StoreError::from)?;
        }
        txn.commit().map_err(StoreError::from)?;

        Ok(next)
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(serde_json::from_slice(&value)?);
        }
        // keys are the raw id bytes, so iteration order is already id order
        Ok(accounts)
    }
}

#[async_trait]
impl LedgerLog for RocksDBStore {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntryId, StoreError> {
        let meta = self.cf(CF_META)?;
        let ledger = self.cf(CF_LEDGER)?;
        let txn = self.db.transaction();

        let last = Self::decode_seq(txn.get_for_update_cf(meta, LEDGER_SEQ_KEY, true)?)?;
        let id = LedgerEntryId(
            last.checked_add(1)
                .ok_or_else(|| StoreError::internal("ledger id space exhausted"))?,
        );

        let record = LedgerEntry::from_new(id, entry, Utc::now());
        txn.put_cf(meta, LEDGER_SEQ_KEY, id.0.to_be_bytes())?;
        txn.put_cf(ledger, id.0.to_be_bytes(), serde_json::to_vec(&record)?)?;
        txn.commit()?;

        Ok(id)
    }

    async fn attach_failure_message(
        &self,
        id: LedgerEntryId,
        message: &str,
    ) -> Result<(), StoreError> {
        let cf = self.cf(CF_LEDGER)?;
        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(cf, id.0.to_be_bytes(), true)?
            .ok_or_else(|| StoreError::NotFound(format!("ledger entry {id}")))?;
        let mut entry: LedgerEntry = serde_json::from_slice(&bytes)?;
        entry.annotate(message);
        txn.put_cf(cf, id.0.to_be_bytes(), serde_json::to_vec(&entry)?)?;
        txn.commit()?;
        Ok(())
    }

    async fn get(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let cf = self.cf(CF_LEDGER)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let cf = self.cf(CF_LEDGER)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}
