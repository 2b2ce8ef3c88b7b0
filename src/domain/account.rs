use crate::domain::money::normalize;
use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier an account may carry.
pub const MAX_ACCOUNT_ID_LEN: usize = 32;

/// Identifier of an account: 1 to 32 characters, unique per store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(value: impl Into<String>) -> Result<Self, EngineError> {
        let value = value.into();
        let len = value.chars().count();
        if len == 0 {
            return Err(EngineError::InvalidAccountId(
                "id must be at least one character long".to_string(),
            ));
        }
        if len > MAX_ACCOUNT_ID_LEN {
            return Err(EngineError::InvalidAccountId(format!(
                "id must not be longer than {MAX_ACCOUNT_ID_LEN} characters"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-negative monetary value held by an account.
///
/// Arithmetic is checked: the engine never lets a balance wrap or go below
/// zero, so the helpers return `None` instead of producing such a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Snaps the balance onto the `precision` grid.
    pub fn normalized(self, precision: u32) -> Self {
        Self(normalize(self.0, precision))
    }

    /// Removes `amount`, or `None` when the result would be negative.
    pub fn debit(self, amount: Amount) -> Option<Self> {
        let next = self.0.checked_sub(amount.value())?;
        (next >= Decimal::ZERO).then_some(Self(next))
    }

    /// Adds `amount`, or `None` on overflow.
    pub fn credit(self, amount: Amount) -> Option<Self> {
        self.0.checked_add(amount.value()).map(Self)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly positive quantity moved by a transfer. Only [`Amount::new`]
/// builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, EngineError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EngineError::InvalidAmount(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// An account as seen by callers: its id and current balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub balance: Balance,
}

impl Account {
    pub fn new(id: AccountId, balance: Balance) -> Self {
        Self { id, balance }
    }
}
