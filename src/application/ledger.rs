use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    Account, AccountRole, Credits, NewEntry, RelatedEntity, Transaction, TransactionId,
    TransactionType,
};
use crate::storage::{
    classify_error, DebitMode, EntryOutcome, OrderLink, Repository, StorageFault,
    TransactionFilter,
};

use super::locks::AccountLocks;
use super::notify::{LedgerEvent, Notifier, TracingNotifier};
use super::retry::RetryPolicy;
use super::AppError;

/// Result of an append that carries an order status change.
#[derive(Debug, Clone)]
pub(crate) enum LinkedAppend {
    Applied {
        transaction: Transaction,
        shortfall: Credits,
    },
    /// The order had already left the expected state; nothing was written
    Stale,
}

/// Sole owner of balance mutation.
///
/// Every append for an account runs under that account's lock, inside one
/// database transaction that writes the entry and the new balance together.
/// Reads go straight to the pool and never wait on the locks.
pub struct LedgerStore {
    repo: Repository,
    locks: AccountLocks,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl LedgerStore {
    pub fn new(repo: Repository, retry: RetryPolicy) -> Self {
        Self {
            repo,
            locks: AccountLocks::new(),
            retry,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account, or return the existing one with the same id.
    pub async fn open_account(&self, account_id: &str, role: AccountRole) -> Result<Account, AppError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(AppError::Validation("account id must not be empty".to_string()));
        }

        let account = self
            .repo
            .insert_account_if_missing(&Account::new(account_id, role))
            .await?;
        if account.role != role {
            tracing::warn!(
                account_id,
                existing_role = %account.role,
                requested_role = %role,
                "account already open with a different role"
            );
        }
        tracing::info!(account_id, role = %account.role, "account opened");
        Ok(account)
    }

    /// Deactivate an account. Further appends are rejected; history stays readable.
    pub async fn deactivate_account(&self, account_id: &str) -> Result<Account, AppError> {
        let _guard = self.locks.acquire(account_id).await;
        if self.repo.deactivate_account(account_id, Utc::now()).await? {
            tracing::info!(account_id, "account deactivated");
        }
        self.get_account(account_id).await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Account, AppError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    pub async fn get_balance(&self, account_id: &str) -> Result<Credits, AppError> {
        Ok(self.get_account(account_id).await?.balance)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts().await?)
    }

    // ========================
    // Ledger writes
    // ========================

    /// Append one signed entry to an account.
    pub async fn append_transaction(
        &self,
        account_id: &str,
        transaction_type: TransactionType,
        amount: Credits,
        reason: &str,
        related_entity: Option<RelatedEntity>,
    ) -> Result<Transaction, AppError> {
        let entry = NewEntry::new(account_id, transaction_type, amount, reason)
            .with_related_opt(related_entity);
        self.append(entry).await
    }

    /// Append a prepared entry. Debits that would overdraw are rejected.
    pub async fn append(&self, entry: NewEntry) -> Result<Transaction, AppError> {
        match self.write(&entry, DebitMode::Strict, None).await? {
            EntryOutcome::Applied { transaction, .. } => Ok(transaction),
            other => Err(outcome_error(&entry, other)),
        }
    }

    /// Debit at most the current balance and record what could not be taken.
    /// Returns the entry together with the shortfall.
    pub async fn append_capped_debit(
        &self,
        entry: NewEntry,
    ) -> Result<(Transaction, Credits), AppError> {
        match self.write(&entry, DebitMode::CapAtBalance, None).await? {
            EntryOutcome::Applied {
                transaction,
                shortfall,
            } => Ok((transaction, shortfall)),
            other => Err(outcome_error(&entry, other)),
        }
    }

    /// Append an entry and move an order in the same database transaction.
    pub(crate) async fn append_linked(
        &self,
        entry: NewEntry,
        mode: DebitMode,
        link: &OrderLink,
    ) -> Result<LinkedAppend, AppError> {
        match self.write(&entry, mode, Some(link)).await? {
            EntryOutcome::Applied {
                transaction,
                shortfall,
            } => Ok(LinkedAppend::Applied {
                transaction,
                shortfall,
            }),
            EntryOutcome::LinkStale => Ok(LinkedAppend::Stale),
            other => Err(outcome_error(&entry, other)),
        }
    }

    async fn write(
        &self,
        entry: &NewEntry,
        mode: DebitMode,
        link: Option<&OrderLink>,
    ) -> Result<EntryOutcome, AppError> {
        entry.validate().map_err(AppError::Validation)?;

        let _guard = self.locks.acquire(&entry.account_id).await;
        let outcome = self
            .retry
            .retry_async(
                |attempt| {
                    if attempt > 0 {
                        tracing::debug!(account_id = %entry.account_id, attempt, "retrying ledger append");
                    }
                    self.repo.apply_entry(entry, mode, link)
                },
                |err| classify_error(err) != StorageFault::Fatal,
            )
            .await
            .map_err(|(err, attempts)| storage_error(&entry.account_id, err, attempts))?;

        if let EntryOutcome::Applied {
            transaction,
            shortfall,
        } = &outcome
        {
            tracing::info!(
                account_id = %transaction.account_id,
                transaction_id = %transaction.id,
                transaction_type = %transaction.transaction_type,
                amount = transaction.amount,
                balance_after = transaction.balance_after,
                shortfall,
                "ledger entry appended"
            );
            self.notifier.notify(LedgerEvent::from(transaction));
        }
        Ok(outcome)
    }

    // ========================
    // Ledger reads
    // ========================

    /// Entries of an account, most recent first.
    pub async fn list_transactions(
        &self,
        account_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        self.get_account(account_id).await?;
        Ok(self.repo.list_transactions_filtered(account_id, filter).await?)
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }
}

fn outcome_error(entry: &NewEntry, outcome: EntryOutcome) -> AppError {
    let account_id = entry.account_id.clone();
    match outcome {
        EntryOutcome::Insufficient { balance } => {
            tracing::info!(
                account_id = %account_id,
                balance,
                required = -entry.amount,
                "debit rejected, insufficient balance"
            );
            AppError::InsufficientBalance {
                account_id,
                balance,
                required: -entry.amount,
            }
        }
        EntryOutcome::AccountMissing => AppError::AccountNotFound(account_id),
        EntryOutcome::AccountInactive => AppError::AccountInactive(account_id),
        EntryOutcome::OutOfRange(message) => {
            tracing::info!(account_id = %account_id, %message, "entry rejected, out of range");
            AppError::Validation(message)
        }
        EntryOutcome::LinkStale => {
            AppError::Database(anyhow::anyhow!("Unexpected order link on account {}", account_id))
        }
        EntryOutcome::Applied { transaction, .. } => AppError::Database(anyhow::anyhow!(
            "Entry {} was applied but reported as a failure",
            transaction.id
        )),
    }
}

fn storage_error(account_id: &str, err: anyhow::Error, attempts: usize) -> AppError {
    match classify_error(&err) {
        StorageFault::Contention => {
            tracing::warn!(account_id, attempts, error = %err, "ledger append kept hitting a locked database");
            AppError::ConcurrencyConflict(account_id.to_string())
        }
        StorageFault::Transient => {
            tracing::warn!(account_id, attempts, error = %err, "storage unavailable");
            AppError::StorageUnavailable {
                attempts,
                message: format!("{:#}", err),
            }
        }
        StorageFault::Fatal => AppError::Database(err),
    }
}
