use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{Credits, OrderStatus, TransactionType};

use super::repository::ts;
use super::Repository;

// Helper structs for repository aggregation

#[derive(Debug, Clone, Default)]
pub struct RevenueAggregate {
    pub settled_orders: i64,
    pub gross: Credits,
    pub refunded: Credits,
    pub credits_granted: Credits,
}

#[derive(Debug, Clone)]
pub struct PackageAggregate {
    pub package_id: Uuid,
    pub name: String,
    pub subscribers: i64,
    pub orders: i64,
    pub refunded_orders: i64,
    pub revenue: Credits,
}

#[derive(Debug, Clone)]
pub struct DailyOrderAggregate {
    pub day: String,
    pub orders: i64,
    pub revenue: Credits,
    pub credits_granted: Credits,
}

#[derive(Debug, Clone)]
pub struct TypeAggregate {
    pub transaction_type: TransactionType,
    pub count: i64,
    pub total: Credits,
}

impl Repository {
    // ========================
    // Reporting queries
    // ========================

    /// Revenue of orders settled in `[from, to)`. Refunded orders settled in the window count as gross.
    /// A refund returns the full `price_charged` to the payer even when the credit
    /// debit was capped, so refunded revenue is always the whole price.
    pub async fn aggregate_revenue(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<RevenueAggregate> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as settled_orders,
                COALESCE(SUM(price_charged), 0) as gross,
                COALESCE(SUM(CASE WHEN status = 'refunded' THEN price_charged ELSE 0 END), 0) as refunded,
                COALESCE(SUM(credits_to_grant), 0) as credits_granted
            FROM purchase_orders
            WHERE status IN ('settled', 'refunded') AND settled_at >= ? AND settled_at < ?
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_one(&self.pool)
        .await
        .context("Failed to aggregate revenue")?;

        Ok(RevenueAggregate {
            settled_orders: row.get("settled_orders"),
            gross: row.get("gross"),
            refunded: row.get("refunded"),
            credits_granted: row.get("credits_granted"),
        })
    }

    /// Per package subscriber counts and revenue for orders settled in `[from, to)`.
    pub async fn aggregate_by_package(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PackageAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT
                o.package_id as package_id,
                p.name as name,
                COUNT(DISTINCT o.account_id) as subscribers,
                COUNT(*) as orders,
                SUM(CASE WHEN o.status = 'refunded' THEN 1 ELSE 0 END) as refunded_orders,
                SUM(o.price_charged) as revenue
            FROM purchase_orders o
            JOIN packages p ON p.package_id = o.package_id
            WHERE o.status IN ('settled', 'refunded') AND o.settled_at >= ? AND o.settled_at < ?
            GROUP BY o.package_id, p.name
            ORDER BY revenue DESC, p.name
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate by package")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("package_id");
                Ok(PackageAggregate {
                    package_id: Uuid::parse_str(&id_str).context("Invalid package ID")?,
                    name: row.get("name"),
                    subscribers: row.get("subscribers"),
                    orders: row.get("orders"),
                    refunded_orders: row.get("refunded_orders"),
                    revenue: row.get("revenue"),
                })
            })
            .collect()
    }

    /// Order counts by status for orders created in `[from, to)`.
    pub async fn count_orders_by_status(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(OrderStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM purchase_orders
            WHERE created_at >= ? AND created_at < ?
            GROUP BY status
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to count orders by status")?;

        rows.iter()
            .map(|row| {
                let status_str: String = row.get("status");
                let status = OrderStatus::from_str(&status_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid order status: {}", status_str))?;
                Ok((status, row.get("count")))
            })
            .collect()
    }

    /// Settled orders per UTC day.
    pub async fn aggregate_daily_orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DailyOrderAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT
                substr(settled_at, 1, 10) as day,
                COUNT(*) as orders,
                SUM(price_charged) as revenue,
                SUM(credits_to_grant) as credits_granted
            FROM purchase_orders
            WHERE status IN ('settled', 'refunded') AND settled_at >= ? AND settled_at < ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate daily orders")?;

        Ok(rows
            .iter()
            .map(|row| DailyOrderAggregate {
                day: row.get("day"),
                orders: row.get("orders"),
                revenue: row.get("revenue"),
                credits_granted: row.get("credits_granted"),
            })
            .collect())
    }

    /// Credits spent per UTC day, as positive numbers.
    pub async fn aggregate_daily_spent(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(String, Credits)>> {
        let rows = sqlx::query(
            r#"
            SELECT substr(created_at, 1, 10) as day, SUM(-amount) as spent
            FROM transactions
            WHERE transaction_type = 'spent' AND created_at >= ? AND created_at < ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate daily spending")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("day"), row.get("spent")))
            .collect())
    }

    /// Entry count and signed total per transaction type in `[from, to)`.
    pub async fn aggregate_by_type(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TypeAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_type, COUNT(*) as count, SUM(amount) as total
            FROM transactions
            WHERE created_at >= ? AND created_at < ?
            GROUP BY transaction_type
            ORDER BY transaction_type
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate by type")?;

        rows.iter()
            .map(|row| {
                let type_str: String = row.get("transaction_type");
                Ok(TypeAggregate {
                    transaction_type: TransactionType::from_str(&type_str).ok_or_else(|| {
                        anyhow::anyhow!("Invalid transaction type: {}", type_str)
                    })?,
                    count: row.get("count"),
                    total: row.get("total"),
                })
            })
            .collect()
    }
}
