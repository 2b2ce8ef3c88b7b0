use crate::domain::account::Account;
use crate::domain::ledger::LedgerEntry;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRecord<'a> {
    account: &'a str,
    balance: String,
}

#[derive(Serialize)]
struct LedgerRecord<'a> {
    id: i64,
    source: &'a str,
    destination: &'a str,
    amount: String,
    error_message: Option<&'a str>,
    created_at: String,
}

/// Writes final balances as `account,balance` CSV.
///
/// Balances are written with their scale intact, so `81.00000` stays `81.00000`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: &[Account]) -> csv::Result<()> {
        if accounts.is_empty() {
            self.writer.write_record(["account", "balance"])?;
        }
        for account in accounts {
            self.writer.serialize(AccountRecord {
                account: account.id.as_str(),
                balance: account.balance.to_string(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes ledger entries as
/// `id,source,destination,amount,error_message,created_at` CSV.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_entries(&mut self, entries: &[LedgerEntry]) -> csv::Result<()> {
        if entries.is_empty() {
            self.writer.write_record([
                "id",
                "source",
                "destination",
                "amount",
                "error_message",
                "created_at",
            ])?;
        }
        for entry in entries {
            self.writer.serialize(LedgerRecord {
                id: entry.id.0,
                source: entry.source.as_str(),
                destination: entry.destination.as_str(),
                amount: entry.amount.to_string(),
                error_message: entry.error_message.as_deref(),
                created_at: entry.created_at.to_rfc3339(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
