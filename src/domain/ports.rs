use super::account::{Account, AccountId, Balance};
use super::ledger::{LedgerEntry, LedgerEntryId, NewLedgerEntry};
use crate::error::StoreError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

/// Why a [`BalancePlan`] refused to produce new balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanRejection {
    InsufficientFunds { available: Decimal, requested: Decimal },
    BalanceTooLarge { balance: Decimal, max: Decimal },
    /// The store handed the plan a different number of rows than it expects.
    UnexpectedRows(usize),
}

/// Computes new balances from the locked current ones.
///
/// Receives balances in the order of the ids passed to
/// [`BalanceStore::write_many`] and must return the same number of balances in
/// the same order. Runs while the rows are locked, so whatever it checks still
/// holds when the new balances are written.
pub type BalancePlan =
    Box<dyn FnOnce(&[Balance]) -> Result<Vec<Balance>, PlanRejection> + Send + 'static>;

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("balance update rejected: {0:?}")]
    Rejected(PlanRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn exists(&self, id: &AccountId) -> Result<bool, StoreError>;

    async fn read(&self, id: &AccountId) -> Result<Option<Balance>, StoreError>;

    /// Stores a new account. Fails with [`StoreError::Conflict`] when the id is taken.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    /// Locks `ids`, feeds their balances to `plan` and writes the result, all in
    /// one atomic scope. Either every row takes the planned value or none does.
    async fn write_many(
        &self,
        ids: &[AccountId],
        plan: BalancePlan,
    ) -> Result<Vec<Balance>, CommitError>;

    async fn accounts(&self) -> Result<Vec<Account>, StoreError>;
}

#[async_trait]
pub trait LedgerLog: Send + Sync {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntryId, StoreError>;

    /// Records why the attempt behind `id` failed. Only the first message sticks.
    async fn attach_failure_message(
        &self,
        id: LedgerEntryId,
        message: &str,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError>;

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;
}

pub type BalanceStoreRef = Arc<dyn BalanceStore>;
pub type LedgerLogRef = Arc<dyn LedgerLog>;
