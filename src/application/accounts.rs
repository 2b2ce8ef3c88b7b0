use crate::config::EngineConfig;
use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::money::normalize;
use crate::domain::ports::BalanceStoreRef;
use crate::error::{EngineError, Result, StoreError};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

/// Outcome of an existence query that keeps "absent" apart from "unknown".
#[derive(Debug)]
pub enum Existence {
    Present,
    Absent,
    /// The store could not answer.
    Indeterminate(StoreError),
}

/// Creates and reads individual accounts.
///
/// Cheap to clone; clones share the same store handle.
#[derive(Clone)]
pub struct AccountService {
    store: BalanceStoreRef,
    config: EngineConfig,
}

impl AccountService {
    pub fn new(store: BalanceStoreRef, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &BalanceStoreRef {
        &self.store
    }

    /// Asks the store whether `id` exists. Storage failures come back as
    /// [`Existence::Indeterminate`]; logging them is up to the caller.
    pub async fn existence(&self, id: &AccountId) -> Existence {
        match self.store.exists(id).await {
            Ok(true) => Existence::Present,
            Ok(false) => Existence::Absent,
            Err(e) => Existence::Indeterminate(e),
        }
    }

    /// Boolean gate over [`existence`](Self::existence). An indeterminate answer is
    /// logged and reads as `false`.
    pub async fn exists(&self, id: &AccountId) -> bool {
        match self.existence(id).await {
            Existence::Present => true,
            Existence::Absent => false,
            Existence::Indeterminate(e) => {
                warn!(account = %id, error = %e, "Account existence check failed");
                false
            }
        }
    }

    pub async fn create_account(&self, id: AccountId, initial_balance: Decimal) -> Result<Account> {
        match self.existence(&id).await {
            Existence::Present => {
                debug!(account = %id, "Rejected create: account already exists");
                return Err(EngineError::AccountAlreadyExists(id));
            }
            Existence::Indeterminate(e) => {
                error!(account = %id, error = %e, "Account existence check failed");
                return Err(EngineError::StorageFailure(e));
            }
            Existence::Absent => {}
        }

        // sign of the input, so a tiny negative cannot round up to zero
        if initial_balance < Decimal::ZERO {
            return Err(EngineError::InvalidBalance(initial_balance));
        }
        let balance = normalize(initial_balance, self.config.precision);
        if balance > self.config.max_balance {
            return Err(EngineError::BalanceTooLarge {
                balance,
                max: self.config.max_balance,
            });
        }

        let account = Account::new(id, Balance::new(balance));
        match self.store.insert(&account).await {
            Ok(()) => {
                info!(account = %account.id, balance = %account.balance, "Account created");
                Ok(account)
            }
            // lost a race against a concurrent create of the same id
            Err(StoreError::Conflict(_)) => Err(EngineError::AccountAlreadyExists(account.id)),
            Err(e) => {
                error!(account = %account.id, error = %e, "Failed to insert account");
                Err(EngineError::StorageFailure(e))
            }
        }
    }

    pub async fn get_account(&self, id: &AccountId) -> Result<Account> {
        match self.store.read(id).await {
            Ok(Some(balance)) => Ok(Account::new(
                id.clone(),
                balance.normalized(self.config.precision),
            )),
            Ok(None) => Err(EngineError::AccountNotFound(id.clone())),
            Err(e) => {
                error!(account = %id, error = %e, "Failed to read account");
                Err(EngineError::StorageFailure(e))
            }
        }
    }

    /// All accounts ordered by id.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let accounts = self
            .store
            .accounts()
            .await
            .map_err(EngineError::StorageFailure)?;
        Ok(accounts
            .into_iter()
            .map(|account| {
                Account::new(account.id, account.balance.normalized(self.config.precision))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryBalanceStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(InMemoryBalanceStore::new()),
            EngineConfig::default(),
        )
    }

    fn id(s: &str) -> AccountId {
        AccountId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_account() {
        let service = service();
        let created = service
            .create_account(id("123"), dec!(100.123456))
            .await
            .unwrap();
        assert_eq!(created.balance, Balance::new(dec!(100.12346)));

        let fetched = service.get_account(&id("123")).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.balance.to_string(), "100.12346");
    }

    #[tokio::test]
    async fn test_create_duplicate_account() {
        let service = service();
        service.create_account(id("A"), dec!(1)).await.unwrap();
        let result = service.create_account(id("A"), dec!(2)).await;
        assert!(matches!(result, Err(EngineError::AccountAlreadyExists(_))));
        assert_eq!(
            service.get_account(&id("A")).await.unwrap().balance,
            Balance::new(dec!(1))
        );
    }

    #[tokio::test]
    async fn test_create_rejects_negative_balance() {
        let service = service();
        let result = service.create_account(id("A"), dec!(-0.01)).await;
        assert!(matches!(result, Err(EngineError::InvalidBalance(_))));
        assert!(!service.exists(&id("A")).await);
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_balance() {
        let service = service();
        let too_big = service.config().max_balance + dec!(1);
        let result = service.create_account(id("A"), too_big).await;
        assert!(matches!(result, Err(EngineError::BalanceTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_balance_limit_applies_after_rounding() {
        let service = service();
        let max = service.config().max_balance;

        let account = service
            .create_account(id("A"), max + dec!(0.000004))
            .await
            .unwrap();
        assert_eq!(account.balance.value(), max);

        let result = service.create_account(id("B"), max + dec!(0.000005)).await;
        assert!(matches!(
            result,
            Err(EngineError::BalanceTooLarge { balance, .. }) if balance == max + dec!(0.00001)
        ));
    }

    #[tokio::test]
    async fn test_tiny_negative_balance_is_rejected() {
        let service = service();
        let result = service.create_account(id("A"), dec!(-0.000001)).await;
        assert!(matches!(result, Err(EngineError::InvalidBalance(_))));
    }

    #[tokio::test]
    async fn test_zero_balance_is_allowed() {
        let service = service();
        let account = service.create_account(id("A"), dec!(0)).await.unwrap();
        assert_eq!(account.balance, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_get_missing_account() {
        let service = service();
        let result = service.get_account(&id("ghost")).await;
        assert!(matches!(result, Err(EngineError::AccountNotFound(_))));
        assert!(matches!(service.existence(&id("ghost")).await, Existence::Absent));
    }

    #[tokio::test]
    async fn test_accounts_listing_is_sorted() {
        let service = service();
        service.create_account(id("b"), dec!(2)).await.unwrap();
        service.create_account(id("a"), dec!(1)).await.unwrap();
        let ids: Vec<String> = service
            .accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
