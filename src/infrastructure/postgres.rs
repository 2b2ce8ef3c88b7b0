//! PostgreSQL adapter.
//!
//! Balances live in `<schema>.account` as `NUMERIC` guarded by
//! `CHECK (balance >= 0)`; ledger entries live in `<schema>.ledger_entry` with
//! `BIGSERIAL` ids. Multi-row writes lock their rows with `FOR UPDATE` in id
//! order inside a single database transaction.

use crate::config::StorageConfig;
use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::ledger::{LedgerEntry, LedgerEntryId, NewLedgerEntry};
use crate::domain::ports::{BalancePlan, BalanceStore, CommitError, LedgerLog};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    accounts: String,
    ledger: String,
}

impl PgStore {
    /// Wraps an existing pool. `schema` must already be a validated identifier.
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            accounts: format!("{schema}.account"),
            ledger: format!("{schema}.ledger_entry"),
        }
    }

    /// Opens a pool from the storage config and bootstraps the schema.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::internal("database_url is not configured"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;

        let store = Self::new(pool, &config.schema);
        store.migrate(&config.schema).await?;
        info!(schema = %config.schema, "Connected to PostgreSQL");
        Ok(store)
    }

    /// Creates the schema and both tables when missing.
    pub async fn migrate(&self, schema: &str) -> Result<(), StoreError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(32) PRIMARY KEY,
                balance NUMERIC NOT NULL CHECK (balance >= 0),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.accounts
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                source VARCHAR(32) NOT NULL,
                destination VARCHAR(32) NOT NULL,
                amount NUMERIC NOT NULL,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.ledger
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_account(row: &PgRow) -> Result<Account, StoreError> {
        let id: String = row.try_get("id")?;
        let balance: Decimal = row.try_get("balance")?;
        Ok(Account::new(parse_id(id)?, Balance::new(balance)))
    }

    fn row_to_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
        let source: String = row.try_get("source")?;
        let destination: String = row.try_get("destination")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(LedgerEntry {
            id: LedgerEntryId(row.try_get("id")?),
            source: parse_id(source)?,
            destination: parse_id(destination)?,
            amount: row.try_get("amount")?,
            error_message: row.try_get("error_message")?,
            created_at,
        })
    }
}

fn parse_id(raw: String) -> Result<AccountId, StoreError> {
    AccountId::new(raw).map_err(|e| StoreError::internal(e.to_string()))
}

#[async_trait]
impl BalanceStore for PgStore {
    async fn exists(&self, id: &AccountId) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
            self.accounts
        ))
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn read(&self, id: &AccountId) -> Result<Option<Balance>, StoreError> {
        let balance = sqlx::query_scalar::<_, Decimal>(&format!(
            "SELECT balance FROM {} WHERE id = $1",
            self.accounts
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance.map(Balance::new))
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, balance, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
            self.accounts
        ))
        .bind(account.id.as_str())
        .bind(account.balance.value())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        Ok(())
    }

    async fn write_many(
        &self,
        ids: &[AccountId],
        plan: BalancePlan,
    ) -> Result<Vec<Balance>, CommitError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        // ORDER BY id makes every writer take its row locks in the same order.
        let rows = sqlx::query(&format!(
            "SELECT id, balance FROM {} WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            self.accounts
        ))
        .bind(&keys)
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let mut locked = HashMap::with_capacity(rows.len());
        for row in &rows {
            let account = Self::row_to_account(row)?;
            locked.insert(account.id, account.balance);
        }
        let current = ids
            .iter()
            .map(|id| {
                locked
                    .get(id)
                    .copied()
                    .ok_or_else(|| StoreError::NotFound(format!("account {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Returning early drops `tx`, which rolls it back.
        let next = plan(current.as_slice()).map_err(CommitError::Rejected)?;
        if next.len() != ids.len() {
            return Err(StoreError::internal(format!(
                "balance plan returned {} balances for {} accounts",
                next.len(),
                ids.len()
            ))
            .into());
        }

        let update = format!(
            "UPDATE {} SET balance = $1, updated_at = NOW() WHERE id = $2",
            self.accounts
        );
        for (id, balance) in ids.iter().zip(&next) {
            sqlx::query(&update)
                .bind(balance.value())
                .bind(id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
        }
        tx.commit().await.map_err(StoreError::from)?;

        Ok(next)
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT id, balance FROM {} ORDER BY id",
            self.accounts
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_account).collect()
    }
}

#[async_trait]
impl LedgerLog for PgStore {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntryId, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            INSERT INTO {} (source, destination, amount, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id
            "#,
            self.ledger
        ))
        .bind(entry.source.as_str())
        .bind(entry.destination.as_str())
        .bind(entry.amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(LedgerEntryId(id))
    }

    async fn attach_failure_message(
        &self,
        id: LedgerEntryId,
        message: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET error_message = COALESCE(error_message, $1) WHERE id = $2",
            self.ledger
        ))
        .bind(message)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("ledger entry {id}")));
        }
        Ok(())
    }

    async fn get(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT id, source, destination, amount, error_message, created_at
            FROM {}
            WHERE id = $1
            "#,
            self.ledger
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, source, destination, amount, error_message, created_at
            FROM {}
            ORDER BY id
            "#,
            self.ledger
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}
