use clap::Parser;
use ledgerline::application::accounts::AccountService;
use ledgerline::application::transfer::TransferEngine;
use ledgerline::config::{AppConfig, Backend, StorageConfig};
use ledgerline::domain::ports::{BalanceStoreRef, LedgerLogRef};
use ledgerline::infrastructure::in_memory::{InMemoryBalanceStore, InMemoryLedgerLog};
use ledgerline::interfaces::csv::operation_reader::OperationReader;
use ledgerline::interfaces::csv::report_writer::{AccountWriter, LedgerWriter};
use ledgerline::logging::init_logging;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// PostgreSQL connection URL. If provided, uses PostgreSQL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// PostgreSQL schema holding the tables
    #[arg(long, env = "DB_SCHEMA")]
    schema: Option<String>,

    /// Fractional digits balances and amounts are normalized to
    #[arg(long)]
    precision: Option<u32>,

    /// Write the ledger to this CSV file after processing
    #[arg(long)]
    ledger_out: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(precision) = self.precision {
            config.engine.precision = precision;
        }
        if let Some(schema) = &self.schema {
            config.storage.schema = schema.clone();
        }
        if let Some(url) = &self.database_url {
            config.storage.backend = Backend::Postgres;
            config.storage.database_url = Some(url.clone());
        }
        if let Some(path) = &self.db_path {
            config.storage.backend = Backend::Rocksdb;
            config.storage.db_path = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

fn in_memory() -> (BalanceStoreRef, LedgerLogRef) {
    (
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryLedgerLog::new()),
    )
}

async fn open_storage(storage: &StorageConfig) -> Result<(BalanceStoreRef, LedgerLogRef)> {
    match storage.backend {
        Backend::Memory => Ok(in_memory()),
        Backend::Rocksdb => {
            #[cfg(feature = "storage-rocksdb")]
            {
                use ledgerline::infrastructure::rocksdb::RocksDBStore;
                let Some(path) = storage.db_path.as_ref() else {
                    miette::bail!("rocksdb backend requires db_path");
                };
                let store = RocksDBStore::open(path).into_diagnostic()?;
                info!(path = %path.display(), "Using RocksDB storage");
                Ok((Arc::new(store.clone()), Arc::new(store)))
            }
            #[cfg(not(feature = "storage-rocksdb"))]
            {
                tracing::warn!(
                    "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
                );
                Ok(in_memory())
            }
        }
        Backend::Postgres => {
            #[cfg(feature = "storage-postgres")]
            {
                use ledgerline::infrastructure::postgres::PgStore;
                let store = PgStore::connect(storage).await.into_diagnostic()?;
                store.health_check().await.into_diagnostic()?;
                Ok((Arc::new(store.clone()), Arc::new(store)))
            }
            #[cfg(not(feature = "storage-postgres"))]
            {
                tracing::warn!(
                    "PostgreSQL storage requested via --database-url, but 'storage-postgres' feature is not enabled. Falling back to in-memory storage."
                );
                Ok(in_memory())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).into_diagnostic()?,
        None => AppConfig::default(),
    };
    cli.apply_to(&mut config);
    config.validate().into_diagnostic()?;

    let _guard = init_logging(&config.logging);

    let (balances, ledger) = open_storage(&config.storage).await?;
    let engine = TransferEngine::new(AccountService::new(balances, config.engine.clone()), ledger);

    // Process operations
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for op_result in reader.operations() {
        match op_result {
            Ok(op) => {
                if let Err(e) = op.apply(&engine).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }

    // Output final state
    let accounts = engine.accounts().accounts().await.into_diagnostic()?;
    info!(accounts = accounts.len(), "Processing complete");
    {
        let stdout = io::stdout();
        let mut writer = AccountWriter::new(stdout.lock());
        writer.write_accounts(&accounts).into_diagnostic()?;
    }

    if let Some(path) = &cli.ledger_out {
        let entries = engine.ledger().entries().await.into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        LedgerWriter::new(file)
            .write_entries(&entries)
            .into_diagnostic()?;
    }

    Ok(())
}
