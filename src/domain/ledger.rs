//! Audit records of transfer attempts.

use crate::domain::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-generated, monotonically increasing ledger entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerEntryId(pub i64);

impl fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the engine hands to [`LedgerLog::append`](crate::domain::ports::LedgerLog::append).
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
}

/// One transfer attempt as recorded in the ledger.
///
/// An entry without an error message is either completed or, if the process
/// died between the ledger append and the balance commit, unresolved. The
/// balances are the source of truth in both cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_new(id: LedgerEntryId, entry: NewLedgerEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            source: entry.source,
            destination: entry.destination,
            amount: entry.amount,
            error_message: None,
            created_at,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }

    /// Attaches `message` unless one is already present; the first note wins.
    pub fn annotate(&mut self, message: &str) {
        if self.error_message.is_none() {
            self.error_message = Some(message.to_string());
        }
    }
}
