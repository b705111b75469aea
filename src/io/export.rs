use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::CreditService;
use crate::domain::{Account, Package, PurchaseOrder, Transaction};

/// Full database snapshot for archival or offline audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub packages: Vec<Package>,
    pub orders: Vec<PurchaseOrder>,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to CSV and JSON
pub struct Exporter<'a> {
    service: &'a CreditService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a CreditService) -> Self {
        Self { service }
    }

    /// Export ledger entries to CSV, in append order. `account_id` limits the export to one account.
    pub async fn export_transactions_csv<W: Write>(
        &self,
        writer: W,
        account_id: Option<&str>,
    ) -> Result<usize> {
        let repo = self.service.repository();
        let transactions = match account_id {
            Some(account_id) => repo.list_account_history(account_id).await?,
            None => repo.list_all_transactions().await?,
        };
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "created_at",
            "account_id",
            "type",
            "amount",
            "balance_after",
            "status",
            "reason",
            "related_kind",
            "related_id",
            "metadata",
        ])?;

        for txn in &transactions {
            let (related_kind, related_id) = txn
                .related_entity
                .as_ref()
                .map(|r| (r.kind.clone(), r.id.clone()))
                .unwrap_or_default();

            csv_writer.write_record([
                txn.id.to_string(),
                txn.sequence.to_string(),
                txn.created_at.to_rfc3339(),
                txn.account_id.clone(),
                txn.transaction_type.as_str().to_string(),
                txn.amount.to_string(),
                txn.balance_after.to_string(),
                txn.status.as_str().to_string(),
                txn.reason.clone(),
                related_kind,
                related_id,
                txn.metadata.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export purchase orders to CSV, newest first
    pub async fn export_orders_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let orders = self.service.repository().list_orders(None, None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "account_id",
            "package_id",
            "payment_ref",
            "status",
            "price_charged",
            "credits_to_grant",
            "validity_days",
            "settlement_transaction_id",
            "failure_reason",
            "created_at",
            "settled_at",
        ])?;

        for order in &orders {
            csv_writer.write_record([
                order.id.to_string(),
                order.account_id.clone(),
                order.package_id.to_string(),
                order.payment_ref.clone(),
                order.status.as_str().to_string(),
                order.price_charged.to_string(),
                order.credits_to_grant.to_string(),
                order.validity_days.map(|d| d.to_string()).unwrap_or_default(),
                order
                    .settlement_transaction_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                order.failure_reason.clone().unwrap_or_default(),
                order.created_at.to_rfc3339(),
                order.settled_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(orders.len())
    }

    /// Export the whole database as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let repo = self.service.repository();

        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts: repo.list_accounts().await?,
            packages: repo.list_packages(None, false).await?,
            orders: repo.list_orders(None, None).await?,
            transactions: repo.list_all_transactions().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
