use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountRole, Audience, OrderStatus, Package, PurchaseOrder, RelatedEntity,
    Transaction, TransactionStatus, TransactionType,
};

use super::MIGRATION_001_INITIAL;

pub(crate) const ACCOUNT_COLUMNS: &str = "account_id, role, balance, subscription_plan_id, subscription_expires_at, active, created_at, deactivated_at";

pub(crate) const TRANSACTION_COLUMNS: &str = "sequence, transaction_id, account_id, transaction_type, amount, balance_after, reason, related_kind, related_id, metadata, status, created_at";

pub(crate) const PACKAGE_COLUMNS: &str = "package_id, name, base_credits, bonus_credits, price, audience, active, validity_days, created_at, updated_at";

pub(crate) const ORDER_COLUMNS: &str = "order_id, account_id, package_id, price_charged, credits_to_grant, validity_days, payment_ref, status, settlement_transaction_id, failure_reason, created_at, settled_at, updated_at";

/// Connection settings for the SQLite pool.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// How a storage failure should be handled by callers that retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// Another writer holds the database lock
    Contention,
    /// Pool exhaustion or I/O trouble that may clear up
    Transient,
    /// Anything retrying cannot fix
    Fatal,
}

/// Classify an error returned by the repository.
pub fn classify_error(err: &anyhow::Error) -> StorageFault {
    for cause in err.chain() {
        if let Some(sqlx_err) = cause.downcast_ref::<sqlx::Error>() {
            return match sqlx_err {
                sqlx::Error::Database(db_err) => {
                    let message = db_err.message().to_lowercase();
                    let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                    // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes
                    let busy_code = code
                        .parse::<i32>()
                        .map(|c| matches!(c & 0xff, 5 | 6))
                        .unwrap_or(false);
                    if busy_code || message.contains("database is locked") {
                        StorageFault::Contention
                    } else {
                        StorageFault::Fatal
                    }
                }
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
                    StorageFault::Transient
                }
                _ => StorageFault::Fatal,
            };
        }
    }
    StorageFault::Fatal
}

/// True when the error comes from a UNIQUE constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}

/// Repository for persisting and querying accounts, ledger entries, packages and orders.
#[derive(Clone)]
pub struct Repository {
    pub(crate) pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    /// The database runs in WAL mode so readers never wait for the ledger writers.
    pub async fn connect(database_url: &str, options: &StorageOptions) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect_options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, options: &StorageOptions) -> Result<Self> {
        let repo = Self::connect(database_url, options).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Row mapping
    // ========================

    pub(crate) fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let role_str: String = row.get("role");
        let plan_str: Option<String> = row.get("subscription_plan_id");
        let expires_str: Option<String> = row.get("subscription_expires_at");
        let created_at_str: String = row.get("created_at");
        let deactivated_str: Option<String> = row.get("deactivated_at");

        Ok(Account {
            id: row.get("account_id"),
            role: AccountRole::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account role: {}", role_str))?,
            balance: row.get("balance"),
            subscription_plan_id: plan_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid subscription plan ID")?,
            subscription_expires_at: parse_opt_ts(expires_str, "subscription_expires_at")?,
            active: row.get::<i32, _>("active") != 0,
            created_at: parse_ts(&created_at_str, "created_at")?,
            deactivated_at: parse_opt_ts(deactivated_str, "deactivated_at")?,
        })
    }

    pub(crate) fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("transaction_id");
        let type_str: String = row.get("transaction_type");
        let status_str: String = row.get("status");
        let related_kind: Option<String> = row.get("related_kind");
        let related_id: Option<String> = row.get("related_id");
        let metadata_json: String = row.get("metadata");
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            account_id: row.get("account_id"),
            transaction_type: TransactionType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            amount: row.get("amount"),
            balance_after: row.get("balance_after"),
            reason: row.get("reason"),
            related_entity: match (related_kind, related_id) {
                (Some(kind), Some(id)) => Some(RelatedEntity { kind, id }),
                _ => None,
            },
            metadata: serde_json::from_str(&metadata_json).context("Invalid metadata JSON")?,
            status: TransactionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
            created_at: parse_ts(&created_at_str, "created_at")?,
        })
    }

    pub(crate) fn row_to_package(row: &SqliteRow) -> Result<Package> {
        let id_str: String = row.get("package_id");
        let audience_str: String = row.get("audience");
        let validity: Option<i64> = row.get("validity_days");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Package {
            id: Uuid::parse_str(&id_str).context("Invalid package ID")?,
            name: row.get("name"),
            base_credits: row.get("base_credits"),
            bonus_credits: row.get("bonus_credits"),
            price: row.get("price"),
            audience: Audience::from_str(&audience_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid audience: {}", audience_str))?,
            active: row.get::<i32, _>("active") != 0,
            validity_days: parse_validity(validity)?,
            created_at: parse_ts(&created_at_str, "created_at")?,
            updated_at: parse_ts(&updated_at_str, "updated_at")?,
        })
    }

    pub(crate) fn row_to_order(row: &SqliteRow) -> Result<PurchaseOrder> {
        let id_str: String = row.get("order_id");
        let package_str: String = row.get("package_id");
        let status_str: String = row.get("status");
        let validity: Option<i64> = row.get("validity_days");
        let settlement_str: Option<String> = row.get("settlement_transaction_id");
        let created_at_str: String = row.get("created_at");
        let settled_at_str: Option<String> = row.get("settled_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(PurchaseOrder {
            id: Uuid::parse_str(&id_str).context("Invalid order ID")?,
            account_id: row.get("account_id"),
            package_id: Uuid::parse_str(&package_str).context("Invalid package ID")?,
            price_charged: row.get("price_charged"),
            credits_to_grant: row.get("credits_to_grant"),
            validity_days: parse_validity(validity)?,
            payment_ref: row.get("payment_ref"),
            status: OrderStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid order status: {}", status_str))?,
            settlement_transaction_id: settlement_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid settlement transaction ID")?,
            failure_reason: row.get("failure_reason"),
            created_at: parse_ts(&created_at_str, "created_at")?,
            settled_at: parse_opt_ts(settled_at_str, "settled_at")?,
            updated_at: parse_ts(&updated_at_str, "updated_at")?,
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 strings so they sort lexically.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str, field: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid {} timestamp", field))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s, field)).transpose()
}

fn parse_validity(value: Option<i64>) -> Result<Option<u32>> {
    value
        .map(|v| u32::try_from(v).context("Invalid validity_days"))
        .transpose()
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use tempfile::TempDir;

    use super::*;

    fn wrapped(err: sqlx::Error) -> anyhow::Error {
        Err::<(), _>(err)
            .context("Failed to save transaction")
            .unwrap_err()
    }

    #[test]
    fn test_classify_transient_and_fatal() {
        assert_eq!(
            classify_error(&wrapped(sqlx::Error::PoolTimedOut)),
            StorageFault::Transient
        );
        assert_eq!(
            classify_error(&wrapped(sqlx::Error::Io(std::io::Error::other("disk gone")))),
            StorageFault::Transient
        );
        assert_eq!(
            classify_error(&wrapped(sqlx::Error::RowNotFound)),
            StorageFault::Fatal
        );
        assert_eq!(
            classify_error(&anyhow::anyhow!("Invalid account role")),
            StorageFault::Fatal
        );
    }

    #[tokio::test]
    async fn test_classify_busy_database() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("busy.db").display());
        let options = StorageOptions {
            max_connections: 2,
            busy_timeout: Duration::ZERO,
        };
        let repo = Repository::init(&url, &options).await.unwrap();

        let mut holder = repo.pool.acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *holder)
            .await
            .unwrap();

        let mut other = repo.pool.acquire().await.unwrap();
        let err = sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *other)
            .await
            .context("Failed to begin ledger transaction")
            .unwrap_err();
        assert_eq!(classify_error(&err), StorageFault::Contention);
        assert!(!is_unique_violation(&err));

        sqlx::query("ROLLBACK").execute(&mut *holder).await.unwrap();
    }
}
