use crate::domain::account::AccountId;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Failures raised by storage adapters.
///
/// Adapters never decide business outcomes; they only report whether the
/// backing store could carry out the request.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal storage error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[cfg(feature = "storage-postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}

impl StoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(Box::new(std::io::Error::other(message.into())))
    }
}

/// Which leg of a transfer an infrastructure failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Destination => write!(f, "destination"),
        }
    }
}

/// Coarse grouping of [`EngineError`] used by callers that translate errors
/// into transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Business,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid account id: {0}")]
    InvalidAccountId(String),
    #[error("source account and destination account cannot be the same")]
    SameAccount,
    #[error("amount must be greater than zero, got {0}")]
    InvalidAmount(Decimal),
    #[error("amount {amount} exceeds the maximum of {max}")]
    AmountTooLarge { amount: Decimal, max: Decimal },
    #[error("initial balance cannot be negative, got {0}")]
    InvalidBalance(Decimal),
    #[error("balance {balance} exceeds the maximum of {max}")]
    BalanceTooLarge { balance: Decimal, max: Decimal },

    #[error("account {0} already exists")]
    AccountAlreadyExists(AccountId),
    #[error("account {0} does not exist")]
    AccountNotFound(AccountId),
    #[error("source account {0} does not exist")]
    SourceNotFound(AccountId),
    #[error("destination account {0} does not exist")]
    DestinationNotFound(AccountId),

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("failed to retrieve {side} account {id}")]
    AccountLookupFailed {
        side: Side,
        id: AccountId,
        #[source]
        source: StoreError,
    },
    #[error("failed to record ledger entry")]
    LedgerWriteFailed(#[source] StoreError),
    #[error("unable to complete transfer")]
    TransferFailed(#[source] StoreError),
    #[error("storage failure")]
    StorageFailure(#[source] StoreError),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::InvalidAccountId(_)
            | EngineError::SameAccount
            | EngineError::InvalidAmount(_)
            | EngineError::AmountTooLarge { .. }
            | EngineError::InvalidBalance(_)
            | EngineError::BalanceTooLarge { .. } => ErrorClass::Validation,
            EngineError::AccountAlreadyExists(_)
            | EngineError::AccountNotFound(_)
            | EngineError::SourceNotFound(_)
            | EngineError::DestinationNotFound(_) => ErrorClass::NotFound,
            EngineError::InsufficientFunds { .. } => ErrorClass::Business,
            EngineError::AccountLookupFailed { .. }
            | EngineError::LedgerWriteFailed(_)
            | EngineError::TransferFailed(_)
            | EngineError::StorageFailure(_) => ErrorClass::Infrastructure,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
