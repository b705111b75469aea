use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::domain::Account;

use super::repository::{ts, ACCOUNT_COLUMNS};
use super::Repository;

impl Repository {
    // ========================
    // Account operations
    // ========================

    /// Insert the account unless one with the same id exists, then return the stored row.
    pub async fn insert_account_if_missing(&self, account: &Account) -> Result<Account> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, role, balance, active, created_at, updated_at)
            VALUES (?, ?, 0, 1, ?, ?)
            ON CONFLICT(account_id) DO NOTHING
            "#,
        )
        .bind(&account.id)
        .bind(account.role.as_str())
        .bind(ts(account.created_at))
        .bind(ts(account.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;

        self.get_account(&account.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Account {} vanished after insert", account.id))
    }

    /// Get an account by ID.
    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE account_id = ?", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// List all accounts, ordered by id.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let query = format!("SELECT {} FROM accounts ORDER BY account_id", ACCOUNT_COLUMNS);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// Deactivate an account (soft delete). Returns false if it was not active.
    pub async fn deactivate_account(&self, account_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let now = ts(at);
        let result = sqlx::query(
            "UPDATE accounts SET active = 0, deactivated_at = ?, updated_at = ? WHERE account_id = ? AND active = 1",
        )
        .bind(&now)
        .bind(&now)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .context("Failed to deactivate account")?;
        Ok(result.rows_affected() > 0)
    }
}
