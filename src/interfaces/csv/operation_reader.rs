use crate::application::transfer::{TransferEngine, TransferRequest};
use crate::domain::account::AccountId;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum OperationType {
    Open,
    Transfer,
}

/// A row as it appears in the file, before its columns are checked
/// against the operation type.
#[derive(Debug, Deserialize)]
struct OperationRow {
    #[serde(rename = "type")]
    r#type: OperationType,
    account: AccountId,
    counterparty: Option<AccountId>,
    // parsed from the raw text; going through f64 would lose digits
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
}

/// One row of an operations file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(try_from = "OperationRow")]
pub enum Operation {
    /// Creates `account` holding `balance`.
    Open { account: AccountId, balance: Decimal },
    /// Moves `amount` from `source` to `destination`.
    Transfer {
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    },
}

impl TryFrom<OperationRow> for Operation {
    type Error = String;

    fn try_from(row: OperationRow) -> std::result::Result<Self, Self::Error> {
        match (row.r#type, row.counterparty) {
            (OperationType::Open, None) => Ok(Operation::Open {
                account: row.account,
                balance: row.amount,
            }),
            (OperationType::Open, Some(_)) => {
                Err("open does not take a counterparty".to_string())
            }
            (OperationType::Transfer, Some(destination)) => Ok(Operation::Transfer {
                source: row.account,
                destination,
                amount: row.amount,
            }),
            (OperationType::Transfer, None) => {
                Err("transfer requires a counterparty".to_string())
            }
        }
    }
}

impl Operation {
    /// Runs the operation against `engine`.
    pub async fn apply(self, engine: &TransferEngine) -> Result<()> {
        match self {
            Operation::Open { account, balance } => {
                engine.accounts().create_account(account, balance).await?;
            }
            Operation::Transfer {
                source,
                destination,
                amount,
            } => {
                engine
                    .transfer(TransferRequest::new(source, destination, amount))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Reads operations from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `csv::Result<Operation>`. It handles whitespace trimming and flexible record
/// lengths automatically.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes operations, so
    /// large files are processed as a stream.
    pub fn operations(self) -> impl Iterator<Item = csv::Result<Operation>> {
        self.reader.into_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn read(data: &str) -> Vec<csv::Result<Operation>> {
        OperationReader::new(data.as_bytes()).operations().collect()
    }

    fn id(s: &str) -> AccountId {
        AccountId::new(s).unwrap()
    }

    #[test]
    fn test_reader_valid_stream() {
        let results = read("type, account, counterparty, amount\nopen, A, , 100\ntransfer, A, B, 19.5");

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &Operation::Open {
                account: id("A"),
                balance: dec!(100),
            }
        );
        assert_eq!(
            results[1].as_ref().unwrap(),
            &Operation::Transfer {
                source: id("A"),
                destination: id("B"),
                amount: dec!(19.5),
            }
        );
    }

    #[test]
    fn test_reader_keeps_every_digit() {
        let results = read(
            "type, account, counterparty, amount\n\
             open, A, , 1234567890123.12346\n\
             transfer, A, B, 999999999999999.99999",
        );

        match results[0].as_ref().unwrap() {
            Operation::Open { balance, .. } => {
                assert_eq!(*balance, dec!(1234567890123.12346));
                assert_eq!(balance.to_string(), "1234567890123.12346");
            }
            other => panic!("expected open, got {other:?}"),
        }
        match results[1].as_ref().unwrap() {
            Operation::Transfer { amount, .. } => {
                assert_eq!(*amount, dec!(999999999999999.99999));
            }
            other => panic!("expected transfer, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_malformed_lines() {
        let results = read(
            "type, account, counterparty, amount\n\
             withdraw, A, , 1.0\n\
             open, A, , lots\n\
             open, , , 1.0\n\
             open, B, , \n\
             open, B, , 2.0",
        );

        assert_eq!(results.len(), 5);
        assert!(results[0].is_err());
        assert!(results[1].is_err());
        // empty id fails account id validation
        assert!(results[2].is_err());
        assert!(results[3].is_err());
        assert!(results[4].is_ok());
    }

    #[test]
    fn test_reader_checks_counterparty_against_type() {
        let results = read(
            "type, account, counterparty, amount\n\
             transfer, A, , 1.0\n\
             open, A, B, 1.0",
        );

        let missing = results[0].as_ref().unwrap_err().to_string();
        assert!(missing.contains("transfer requires a counterparty"));
        let extra = results[1].as_ref().unwrap_err().to_string();
        assert!(extra.contains("open does not take a counterparty"));
    }

    #[test]
    fn test_reader_rejects_long_account_id() {
        let data = format!(
            "type, account, counterparty, amount\nopen, {}, , 1.0",
            "x".repeat(33)
        );
        assert!(read(&data)[0].is_err());
    }
}
