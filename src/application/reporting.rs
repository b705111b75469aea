use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Credits, OrderStatus, TransactionType};
use crate::storage::Repository;

use super::AppError;

/// Half-open reporting window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ReportRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, AppError> {
        if from >= to {
            return Err(AppError::Validation(format!(
                "report range start {} must be before end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueReport {
    pub range: ReportRange,
    pub settled_orders: i64,
    pub total_revenue: Credits,
    pub refunded_revenue: Credits,
    pub net_revenue: Credits,
    pub credits_granted: Credits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub range: ReportRange,
    pub packages: Vec<PackageSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub package_id: Uuid,
    pub name: String,
    pub subscribers: i64,
    pub orders_settled: i64,
    pub refunded_orders: i64,
    pub revenue: Credits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSuccessReport {
    pub range: ReportRange,
    pub counts: BTreeMap<String, i64>,
    pub total_orders: i64,
    /// Share of orders that reached an outcome and were paid; 0 when none did
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub day: String,
    pub orders_settled: i64,
    pub revenue: Credits,
    pub credits_granted: Credits,
    pub credits_spent: Credits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSummary {
    pub transaction_type: TransactionType,
    pub count: i64,
    pub total: Credits,
}

/// Read-only aggregates for the admin dashboard. Never touches the writer locks.
pub struct ReportingService {
    repo: Repository,
}

impl ReportingService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn revenue_report(&self, range: ReportRange) -> Result<RevenueReport, AppError> {
        let agg = self.repo.aggregate_revenue(range.from, range.to).await?;
        Ok(RevenueReport {
            range,
            settled_orders: agg.settled_orders,
            total_revenue: agg.gross,
            refunded_revenue: agg.refunded,
            net_revenue: agg.gross - agg.refunded,
            credits_granted: agg.credits_granted,
        })
    }

    pub async fn package_report(&self, range: ReportRange) -> Result<PackageReport, AppError> {
        let packages = self
            .repo
            .aggregate_by_package(range.from, range.to)
            .await?
            .into_iter()
            .map(|agg| PackageSummary {
                package_id: agg.package_id,
                name: agg.name,
                subscribers: agg.subscribers,
                orders_settled: agg.orders,
                refunded_orders: agg.refunded_orders,
                revenue: agg.revenue,
            })
            .collect();
        Ok(PackageReport { range, packages })
    }

    pub async fn order_success_report(
        &self,
        range: ReportRange,
    ) -> Result<OrderSuccessReport, AppError> {
        let rows = self.repo.count_orders_by_status(range.from, range.to).await?;

        let mut counts: BTreeMap<String, i64> = OrderStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        for (status, count) in &rows {
            counts.insert(status.as_str().to_string(), *count);
        }

        let count_of = |status: OrderStatus| {
            rows.iter()
                .find(|(s, _)| *s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };
        let paid = count_of(OrderStatus::Settled) + count_of(OrderStatus::Refunded);
        let decided = paid + count_of(OrderStatus::Failed);
        let success_rate = if decided > 0 {
            paid as f64 / decided as f64
        } else {
            0.0
        };

        Ok(OrderSuccessReport {
            range,
            total_orders: rows.iter().map(|(_, c)| c).sum(),
            counts,
            success_rate,
        })
    }

    /// Per UTC day activity, only days with any activity are listed.
    pub async fn daily_series(&self, range: ReportRange) -> Result<Vec<DailyPoint>, AppError> {
        let orders = self.repo.aggregate_daily_orders(range.from, range.to).await?;
        let spent = self.repo.aggregate_daily_spent(range.from, range.to).await?;

        let mut days: BTreeMap<String, DailyPoint> = BTreeMap::new();
        for agg in orders {
            let point = days.entry(agg.day.clone()).or_insert_with(|| DailyPoint {
                day: agg.day.clone(),
                ..Default::default()
            });
            point.orders_settled = agg.orders;
            point.revenue = agg.revenue;
            point.credits_granted = agg.credits_granted;
        }
        for (day, credits) in spent {
            let point = days.entry(day.clone()).or_insert_with(|| DailyPoint {
                day,
                ..Default::default()
            });
            point.credits_spent = credits;
        }

        Ok(days.into_values().collect())
    }

    pub async fn transaction_type_report(
        &self,
        range: ReportRange,
    ) -> Result<Vec<TypeSummary>, AppError> {
        Ok(self
            .repo
            .aggregate_by_type(range.from, range.to)
            .await?
            .into_iter()
            .map(|agg| TypeSummary {
                transaction_type: agg.transaction_type,
                count: agg.count,
                total: agg.total,
            })
            .collect())
    }
}
