use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::domain::{check_account, Account, Credits, IntegrityIssue, IntegrityReport, Transaction};
use crate::storage::{Repository, TransactionFilter};

use super::adjustment::AdminAdjustments;
use super::catalog::PackageCatalog;
use super::gateway::{ManualGateway, PaymentGateway};
use super::ledger::LedgerStore;
use super::notify::{Notifier, TracingNotifier};
use super::purchase::PurchaseOrchestrator;
use super::reporting::ReportingService;
use super::AppError;

/// What a user sees on their credits page.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub account: Account,
    pub balance: Credits,
    pub has_active_subscription: bool,
    pub recent_transactions: Vec<Transaction>,
}

/// Application service wiring the ledger, catalog, orders, adjustments and reports
/// over one database. This is the primary interface for any client (CLI, HTTP handler, worker).
pub struct CreditService {
    repo: Repository,
    ledger: Arc<LedgerStore>,
    catalog: PackageCatalog,
    orders: PurchaseOrchestrator,
    adjustments: AdminAdjustments,
    reporting: ReportingService,
    recent_transactions: usize,
}

impl CreditService {
    /// Build the service over an already migrated repository.
    pub fn new(
        repo: Repository,
        config: &Config,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let ledger = Arc::new(
            LedgerStore::new(repo.clone(), config.retry.clone()).with_notifier(notifier),
        );
        Self {
            catalog: PackageCatalog::new(repo.clone()),
            orders: PurchaseOrchestrator::new(ledger.clone(), repo.clone(), gateway),
            adjustments: AdminAdjustments::new(ledger.clone()),
            reporting: ReportingService::new(repo.clone()),
            ledger,
            repo,
            recent_transactions: config.recent_transactions,
        }
    }

    /// Open (creating if needed) and migrate the configured database.
    pub async fn init(config: &Config) -> Result<Self, AppError> {
        Self::init_with(config, Arc::new(ManualGateway), Arc::new(TracingNotifier)).await
    }

    pub async fn init_with(
        config: &Config,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        let repo = Repository::init(&config.database_url(), &config.storage_options()).await?;
        tracing::debug!(database = %config.database_path, "database ready");
        Ok(Self::new(repo, config, gateway, notifier))
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    pub fn orders(&self) -> &PurchaseOrchestrator {
        &self.orders
    }

    pub fn adjustments(&self) -> &AdminAdjustments {
        &self.adjustments
    }

    pub fn reporting(&self) -> &ReportingService {
        &self.reporting
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }

    /// Account, balance and the most recent entries in one call.
    pub async fn get_account_summary(&self, account_id: &str) -> Result<AccountSummary, AppError> {
        let account = self.ledger.get_account(account_id).await?;
        let filter = TransactionFilter {
            limit: Some(self.recent_transactions),
            ..Default::default()
        };
        let recent_transactions = self.ledger.list_transactions(account_id, &filter).await?;

        Ok(AccountSummary {
            balance: account.balance,
            has_active_subscription: account.has_active_subscription(chrono::Utc::now()),
            account,
            recent_transactions,
        })
    }

    // ========================
    // Integrity
    // ========================

    /// Replay every account's history and look for double-credited orders.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.repo.list_accounts().await?;
        let mut issues = Vec::new();
        let mut transaction_count = 0;

        for account in &accounts {
            let history = self.repo.list_account_history(&account.id).await?;
            transaction_count += history.len();
            issues.extend(check_account(account, &history));
        }

        for (order_ref, count) in self.repo.find_duplicate_settlements().await? {
            issues.push(IntegrityIssue::DuplicateSettlement { order_ref, count });
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "ledger integrity check found problems");
        }

        Ok(IntegrityReport {
            account_count: accounts.len(),
            transaction_count,
            issues,
        })
    }
}
