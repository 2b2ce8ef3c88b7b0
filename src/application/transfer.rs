use crate::application::accounts::{AccountService, Existence};
use crate::config::EngineConfig;
use crate::domain::account::{Account, AccountId, Amount, Balance};
use crate::domain::ledger::{LedgerEntryId, NewLedgerEntry};
use crate::domain::money::normalize;
use crate::domain::ports::{BalancePlan, CommitError, LedgerLogRef, PlanRejection};
use crate::error::{EngineError, Result, Side, StoreError};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

/// A request to move `amount` from `source` to `destination`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
}

impl TransferRequest {
    pub fn new(source: AccountId, destination: AccountId, amount: Decimal) -> Self {
        Self {
            source,
            destination,
            amount,
        }
    }
}

/// What a successful transfer left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub entry_id: LedgerEntryId,
    pub source_balance: Balance,
    pub destination_balance: Balance,
}

/// Moves funds between two accounts.
///
/// Every attempt that passes validation is appended to the ledger before any
/// balance is touched. Both balances are then rewritten inside one atomic
/// scope of the balance store; if that scope fails, the ledger entry is
/// annotated with the cause and no balance changes.
#[derive(Clone)]
pub struct TransferEngine {
    accounts: AccountService,
    ledger: LedgerLogRef,
}

impl TransferEngine {
    pub fn new(accounts: AccountService, ledger: LedgerLogRef) -> Self {
        Self { accounts, ledger }
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn ledger(&self) -> &LedgerLogRef {
        &self.ledger
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let TransferRequest {
            source,
            destination,
            amount,
        } = request;
        let config = self.accounts.config();

        if source == destination {
            debug!(account = %source, "Rejected transfer to the same account");
            return Err(EngineError::SameAccount);
        }
        self.require(&source, Side::Source).await?;
        self.require(&destination, Side::Destination).await?;

        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }
        let normalized = normalize(amount, config.precision);
        if normalized > config.max_amount {
            return Err(EngineError::AmountTooLarge {
                amount: normalized,
                max: config.max_amount,
            });
        }
        // a positive amount below the grid rounds to zero
        let amount = Amount::new(normalized)?;

        let source_account = self.lookup(&source, Side::Source).await?;
        let destination_account = self.lookup(&destination, Side::Destination).await?;

        let (new_source, new_destination) = plan_transfer(
            source_account.balance,
            destination_account.balance,
            amount,
            config,
        )
        .map_err(rejection_error)?;
        debug!(
            source = %source,
            destination = %destination,
            amount = %amount.value(),
            new_source = %new_source,
            new_destination = %new_destination,
            "Transfer validated"
        );

        // Run the commit protocol on its own task so that a caller dropping
        // this future cannot stop it halfway.
        let engine = self.clone();
        tokio::spawn(async move { engine.commit(source, destination, amount).await })
            .await
            .map_err(|e| EngineError::TransferFailed(StoreError::Internal(Box::new(e))))?
    }

    async fn require(&self, id: &AccountId, side: Side) -> Result<()> {
        match self.accounts.existence(id).await {
            Existence::Present => Ok(()),
            Existence::Absent => {
                debug!(account = %id, %side, "Rejected transfer: account does not exist");
                Err(not_found(id, side))
            }
            Existence::Indeterminate(source) => {
                error!(account = %id, %side, error = %source, "Account existence check failed");
                Err(EngineError::AccountLookupFailed {
                    side,
                    id: id.clone(),
                    source,
                })
            }
        }
    }

    async fn lookup(&self, id: &AccountId, side: Side) -> Result<Account> {
        match self.accounts.get_account(id).await {
            Ok(account) => Ok(account),
            Err(EngineError::AccountNotFound(_)) => Err(not_found(id, side)),
            // already logged by the account service
            Err(EngineError::StorageFailure(source)) => Err(EngineError::AccountLookupFailed {
                side,
                id: id.clone(),
                source,
            }),
            Err(other) => Err(other),
        }
    }

    async fn commit(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let entry_id = self
            .ledger
            .append(NewLedgerEntry {
                source: source.clone(),
                destination: destination.clone(),
                amount: amount.value(),
            })
            .await
            .map_err(|e| {
                error!(source = %source, destination = %destination, error = %e, "Failed to append ledger entry");
                EngineError::LedgerWriteFailed(e)
            })?;

        // Balances are re-read under the store's lock; the values checked
        // above may already be stale.
        let config = self.accounts.config().clone();
        let plan: BalancePlan = Box::new(
            move |current: &[Balance]| -> std::result::Result<Vec<Balance>, PlanRejection> {
                let &[source_balance, destination_balance] = current else {
                    return Err(PlanRejection::UnexpectedRows(current.len()));
                };
                let (new_source, new_destination) =
                    plan_transfer(source_balance, destination_balance, amount, &config)?;
                Ok(vec![new_source, new_destination])
            },
        );

        let ids = [source.clone(), destination.clone()];
        match self.accounts.store().write_many(&ids, plan).await {
            Ok(balances) => match balances.as_slice() {
                &[source_balance, destination_balance] => {
                    info!(
                        entry_id = %entry_id,
                        source = %source,
                        destination = %destination,
                        amount = %amount.value(),
                        "Transfer committed"
                    );
                    Ok(TransferReceipt {
                        entry_id,
                        source_balance,
                        destination_balance,
                    })
                }
                other => {
                    let e = StoreError::internal(format!(
                        "store returned {} balances for a two-account transfer",
                        other.len()
                    ));
                    error!(entry_id = %entry_id, error = %e, "Transfer commit returned malformed result");
                    self.annotate(entry_id, &e.to_string()).await;
                    Err(EngineError::TransferFailed(e))
                }
            },
            Err(CommitError::Rejected(rejection)) => {
                let err = rejection_error(rejection);
                debug!(entry_id = %entry_id, reason = %err, "Transfer rejected under lock");
                self.annotate(entry_id, &err.to_string()).await;
                Err(err)
            }
            Err(CommitError::Store(e)) => {
                error!(
                    entry_id = %entry_id,
                    source = %source,
                    destination = %destination,
                    error = %e,
                    "Transfer commit failed, balances unchanged"
                );
                self.annotate(entry_id, &e.to_string()).await;
                Err(EngineError::TransferFailed(e))
            }
        }
    }

    /// Best effort: a failed annotation is logged and never changes the outcome.
    async fn annotate(&self, entry_id: LedgerEntryId, message: &str) {
        if let Err(e) = self.ledger.attach_failure_message(entry_id, message).await {
            error!(entry_id = %entry_id, error = %e, "Failed to annotate ledger entry");
        }
    }
}

/// Post-transfer balances, or why the transfer cannot happen.
fn plan_transfer(
    source: Balance,
    destination: Balance,
    amount: Amount,
    config: &EngineConfig,
) -> std::result::Result<(Balance, Balance), PlanRejection> {
    let debited = source
        .debit(amount)
        .ok_or(PlanRejection::InsufficientFunds {
            available: source.value(),
            requested: amount.value(),
        })?;
    let credited = destination
        .credit(amount)
        .filter(|balance| balance.value() <= config.max_balance)
        .ok_or(PlanRejection::BalanceTooLarge {
            balance: destination.value().saturating_add(amount.value()),
            max: config.max_balance,
        })?;
    Ok((
        debited.normalized(config.precision),
        credited.normalized(config.precision),
    ))
}

fn rejection_error(rejection: PlanRejection) -> EngineError {
    match rejection {
        PlanRejection::InsufficientFunds {
            available,
            requested,
        } => EngineError::InsufficientFunds {
            available,
            requested,
        },
        PlanRejection::BalanceTooLarge { balance, max } => {
            EngineError::BalanceTooLarge { balance, max }
        }
        PlanRejection::UnexpectedRows(rows) => EngineError::TransferFailed(StoreError::internal(
            format!("balance plan expected 2 rows, got {rows}"),
        )),
    }
}

fn not_found(id: &AccountId, side: Side) -> EngineError {
    match side {
        Side::Source => EngineError::SourceNotFound(id.clone()),
        Side::Destination => EngineError::DestinationNotFound(id.clone()),
    }
}
