use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::domain::{
    capped_debit, extend_subscription, Credits, NewEntry, OrderId, OrderStatus,
    SubscriptionGrant, Transaction, TransactionId, TransactionStatus, TransactionType,
};

use super::repository::{parse_ts, ts, TRANSACTION_COLUMNS};
use super::Repository;

/// How a debit larger than the balance is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitMode {
    /// Reject the entry
    Strict,
    /// Debit what is there and record the rest as shortfall
    CapAtBalance,
}

/// An order status change that must commit together with a ledger entry.
#[derive(Debug, Clone)]
pub struct OrderLink {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Store the new entry as the order's settlement and stamp settled_at
    pub record_settlement: bool,
    pub subscription: Option<SubscriptionGrant>,
    /// Entry to mark reversed when the new entry fully offsets it
    pub reverses: Option<TransactionId>,
}

impl OrderLink {
    pub fn new(order_id: OrderId, from: OrderStatus, to: OrderStatus) -> Self {
        Self {
            order_id,
            from,
            to,
            record_settlement: false,
            subscription: None,
            reverses: None,
        }
    }

    pub fn settlement(mut self, subscription: Option<SubscriptionGrant>) -> Self {
        self.record_settlement = true;
        self.subscription = subscription;
        self
    }

    pub fn reversing(mut self, original: Option<TransactionId>) -> Self {
        self.reverses = original;
        self
    }
}

/// What happened to an append attempt. Only `Applied` was committed.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Applied {
        transaction: Transaction,
        shortfall: Credits,
    },
    Insufficient {
        balance: Credits,
    },
    AccountMissing,
    AccountInactive,
    /// The resulting balance or subscription expiry cannot be represented
    OutOfRange(String),
    /// The linked order was no longer in the expected state
    LinkStale,
}

/// Filter for querying ledger entries.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    /// Kind of the related entity, e.g. `purchase_order`
    pub category: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Case-insensitive match on reason or related entity id
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Repository {
    // ========================
    // Ledger entry operations
    // ========================

    /// Apply one entry in its own database transaction.
    /// Nothing is written unless the outcome is `Applied`.
    pub async fn apply_entry(
        &self,
        entry: &NewEntry,
        mode: DebitMode,
        link: Option<&OrderLink>,
    ) -> Result<EntryOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger transaction")?;

        let outcome = Self::apply_entry_in(&mut *tx, entry, mode, link).await?;

        if matches!(outcome, EntryOutcome::Applied { .. }) {
            tx.commit()
                .await
                .context("Failed to commit ledger transaction")?;
        } else {
            tx.rollback()
                .await
                .context("Failed to roll back ledger transaction")?;
        }
        Ok(outcome)
    }

    async fn apply_entry_in(
        conn: &mut SqliteConnection,
        entry: &NewEntry,
        mode: DebitMode,
        link: Option<&OrderLink>,
    ) -> Result<EntryOutcome> {
        let now = Utc::now();
        let now_str = ts(now);

        // Every path starts with a write so SQLite takes the write lock up front
        // instead of upgrading a read snapshot later.
        if let Some(link) = link {
            let result = sqlx::query(
                "UPDATE purchase_orders SET status = ?, updated_at = ? WHERE order_id = ? AND status = ?",
            )
            .bind(link.to.as_str())
            .bind(&now_str)
            .bind(link.order_id.to_string())
            .bind(link.from.as_str())
            .execute(&mut *conn)
            .await
            .context("Failed to transition order")?;

            if result.rows_affected() == 0 {
                return Ok(EntryOutcome::LinkStale);
            }
        }

        let row = sqlx::query(
            r#"
            UPDATE accounts SET updated_at = ?
            WHERE account_id = ?
            RETURNING balance, active, subscription_plan_id, subscription_expires_at
            "#,
        )
        .bind(&now_str)
        .bind(&entry.account_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock account row")?;

        let Some(row) = row else {
            return Ok(EntryOutcome::AccountMissing);
        };
        if row.get::<i32, _>("active") == 0 {
            return Ok(EntryOutcome::AccountInactive);
        }
        let balance: Credits = row.get("balance");

        let (amount, shortfall) = match mode {
            DebitMode::Strict => (entry.amount, 0),
            DebitMode::CapAtBalance if entry.amount < 0 => {
                let debit = capped_debit(balance, -entry.amount);
                (debit.applied, debit.shortfall)
            }
            DebitMode::CapAtBalance => (entry.amount, 0),
        };

        let Some(balance_after) = balance.checked_add(amount) else {
            return Ok(EntryOutcome::OutOfRange(format!(
                "balance {} plus {} exceeds the credit range",
                balance, amount
            )));
        };
        if balance_after < 0 {
            return Ok(EntryOutcome::Insufficient { balance });
        }

        let mut entry = entry.clone();
        if shortfall > 0 {
            let requested = -entry.amount;
            entry.reason = format!(
                "{} (shortfall: {} credits already spent)",
                entry.reason, shortfall
            );
            entry = entry
                .with_meta("requested", requested)
                .with_meta("applied", -amount)
                .with_meta("shortfall", shortfall);
        }

        let mut transaction = entry.into_transaction(amount, balance_after);
        transaction.created_at = now;

        sqlx::query("UPDATE accounts SET balance = ? WHERE account_id = ?")
            .bind(balance_after)
            .bind(&transaction.account_id)
            .execute(&mut *conn)
            .await
            .context("Failed to update balance")?;

        let metadata_json = serde_json::to_string(&transaction.metadata)?;
        let sequence: i64 = sqlx::query(
            r#"
            INSERT INTO transactions (transaction_id, account_id, transaction_type, amount, balance_after, reason, related_kind, related_id, metadata, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING sequence
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(&transaction.account_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount)
        .bind(transaction.balance_after)
        .bind(&transaction.reason)
        .bind(transaction.related_entity.as_ref().map(|r| r.kind.clone()))
        .bind(transaction.related_entity.as_ref().map(|r| r.id.clone()))
        .bind(&metadata_json)
        .bind(transaction.status.as_str())
        .bind(ts(transaction.created_at))
        .fetch_one(&mut *conn)
        .await
        .context("Failed to save transaction")?
        .get("sequence");
        transaction.sequence = sequence;

        if let Some(link) = link {
            if link.record_settlement {
                sqlx::query(
                    "UPDATE purchase_orders SET settlement_transaction_id = ?, settled_at = ? WHERE order_id = ?",
                )
                .bind(transaction.id.to_string())
                .bind(&now_str)
                .bind(link.order_id.to_string())
                .execute(&mut *conn)
                .await
                .context("Failed to record settlement")?;
            }

            if let Some(grant) = link.subscription {
                let plan_str: Option<String> = row.get("subscription_plan_id");
                let expires_str: Option<String> = row.get("subscription_expires_at");
                let current_plan = plan_str
                    .map(|s| uuid::Uuid::parse_str(&s))
                    .transpose()
                    .context("Invalid subscription plan ID")?;
                let current_expiry = expires_str
                    .map(|s| parse_ts(&s, "subscription_expires_at"))
                    .transpose()?;
                let Some(expires_at) =
                    extend_subscription(current_plan, current_expiry, grant, now)
                else {
                    return Ok(EntryOutcome::OutOfRange(format!(
                        "subscription of {} days cannot be represented",
                        grant.validity_days
                    )));
                };

                sqlx::query(
                    "UPDATE accounts SET subscription_plan_id = ?, subscription_expires_at = ? WHERE account_id = ?",
                )
                .bind(grant.plan_id.to_string())
                .bind(ts(expires_at))
                .bind(&transaction.account_id)
                .execute(&mut *conn)
                .await
                .context("Failed to extend subscription")?;
            }

            if let (Some(original), 0) = (link.reverses, shortfall) {
                sqlx::query(
                    "UPDATE transactions SET status = ? WHERE transaction_id IN (?, ?)",
                )
                .bind(TransactionStatus::Reversed.as_str())
                .bind(original.to_string())
                .bind(transaction.id.to_string())
                .execute(&mut *conn)
                .await
                .context("Failed to mark reversed entries")?;
                transaction.status = TransactionStatus::Reversed;
            }
        }

        Ok(EntryOutcome::Applied {
            transaction,
            shortfall,
        })
    }

    /// Get an entry by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE transaction_id = ?",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    /// List an account's entries, most recent first, with optional filters.
    pub async fn list_transactions_filtered(
        &self,
        account_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        // Build query dynamically based on filters
        let mut query = format!(
            "SELECT {} FROM transactions WHERE account_id = ?",
            TRANSACTION_COLUMNS
        );

        let from_date_str = filter.from_date.map(ts);
        let to_date_str = filter.to_date.map(ts);
        let search_pattern = filter
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.trim().to_lowercase()));

        if filter.transaction_type.is_some() {
            query.push_str(" AND transaction_type = ?");
        }
        if filter.category.is_some() {
            query.push_str(" AND related_kind = ?");
        }
        if from_date_str.is_some() {
            query.push_str(" AND created_at >= ?");
        }
        if to_date_str.is_some() {
            query.push_str(" AND created_at <= ?");
        }
        if search_pattern.is_some() {
            query.push_str(
                " AND (LOWER(reason) LIKE ? OR LOWER(COALESCE(related_id, '')) LIKE ?)",
            );
        }

        query.push_str(" ORDER BY sequence DESC");

        match (filter.limit, filter.offset) {
            (Some(limit), Some(offset)) => {
                query.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => query.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => query.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        let mut sql_query = sqlx::query(&query).bind(account_id);

        if let Some(kind) = filter.transaction_type {
            sql_query = sql_query.bind(kind.as_str());
        }
        if let Some(ref category) = filter.category {
            sql_query = sql_query.bind(category);
        }
        if let Some(ref fd_str) = from_date_str {
            sql_query = sql_query.bind(fd_str);
        }
        if let Some(ref td_str) = to_date_str {
            sql_query = sql_query.bind(td_str);
        }
        if let Some(ref pattern) = search_pattern {
            sql_query = sql_query.bind(pattern).bind(pattern);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// All entries of one account in append order.
    pub async fn list_account_history(&self, account_id: &str) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE account_id = ? ORDER BY sequence",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list account history")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// All entries, in append order.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions ORDER BY sequence",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Orders credited by more than one `purchased` entry.
    pub async fn find_duplicate_settlements(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT related_id, COUNT(*) as count
            FROM transactions
            WHERE transaction_type = 'purchased' AND related_kind = 'purchase_order'
            GROUP BY related_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to check duplicate settlements")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("related_id"), row.get("count")))
            .collect())
    }
}
