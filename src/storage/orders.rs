use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::domain::{OrderId, OrderStatus, PurchaseOrder};

use super::repository::{ts, ORDER_COLUMNS};
use super::Repository;

impl Repository {
    // ========================
    // Purchase order operations
    // ========================

    /// Save a new order. Fails with a unique violation if the payment reference is taken.
    pub async fn save_order(&self, order: &PurchaseOrder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (order_id, account_id, package_id, price_charged, credits_to_grant, validity_days, payment_ref, status, settlement_transaction_id, failure_reason, created_at, settled_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order.id.to_string())
        .bind(&order.account_id)
        .bind(order.package_id.to_string())
        .bind(order.price_charged)
        .bind(order.credits_to_grant)
        .bind(order.validity_days.map(i64::from))
        .bind(&order.payment_ref)
        .bind(order.status.as_str())
        .bind(order.settlement_transaction_id.map(|id| id.to_string()))
        .bind(&order.failure_reason)
        .bind(ts(order.created_at))
        .bind(order.settled_at.map(ts))
        .bind(ts(order.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save order")?;
        Ok(())
    }

    /// Move an order from `from` to `to` if it is still in `from`.
    /// Returns false when another caller got there first.
    pub async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        failure_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = ?, failure_reason = COALESCE(?, failure_reason), updated_at = ?
            WHERE order_id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(failure_reason)
        .bind(ts(at))
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to transition order")?;
        Ok(result.rows_affected() > 0)
    }

    /// Get an order by ID.
    pub async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>> {
        let query = format!(
            "SELECT {} FROM purchase_orders WHERE order_id = ?",
            ORDER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order")?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    /// Get an order by its gateway payment reference.
    pub async fn get_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<PurchaseOrder>> {
        let query = format!(
            "SELECT {} FROM purchase_orders WHERE payment_ref = ?",
            ORDER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(payment_ref)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order by payment reference")?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    /// List orders, newest first, optionally by account and status.
    pub async fn list_orders(
        &self,
        account_id: Option<&str>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<PurchaseOrder>> {
        let mut query = format!("SELECT {} FROM purchase_orders WHERE 1=1", ORDER_COLUMNS);
        if account_id.is_some() {
            query.push_str(" AND account_id = ?");
        }
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at DESC, order_id");

        let mut sql_query = sqlx::query(&query);
        if let Some(account_id) = account_id {
            sql_query = sql_query.bind(account_id);
        }
        if let Some(status) = status {
            sql_query = sql_query.bind(status.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list orders")?;

        rows.iter().map(Self::row_to_order).collect()
    }
}
