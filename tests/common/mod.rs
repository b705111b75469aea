// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use creditbook::application::{
    CreditService, ManualGateway, Notifier, PaymentGateway, RetryPolicy, TracingNotifier,
};
use creditbook::config::Config;
use creditbook::domain::{AccountRole, Audience, Package, PackageSpec, PaymentOutcome, PurchaseOrder};
use tempfile::TempDir;

/// Config pointing at a fresh database inside `temp_dir`, with short retry delays.
pub fn test_config(temp_dir: &TempDir) -> Config {
    let db_path = temp_dir.path().join("test.db");
    let mut config = Config::default().with_database_path(db_path.to_str().unwrap());
    config.retry = RetryPolicy::new(8, 2, 50, 0.2);
    config
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(CreditService, TempDir)> {
    test_service_with(Arc::new(ManualGateway), Arc::new(TracingNotifier)).await
}

pub async fn test_service_with(
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
) -> Result<(CreditService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let service = CreditService::init_with(&config, gateway, notifier).await?;
    Ok((service, temp_dir))
}

/// Test fixture: the packages and accounts most scenarios start from
pub struct Fixtures;

impl Fixtures {
    /// 200 credits + 50 bonus for 1500, sold to teachers
    pub async fn starter_package(service: &CreditService) -> Result<Package> {
        Ok(service
            .catalog()
            .create_package(PackageSpec::new("Starter", 200, 50, 1500, Audience::Teacher))
            .await?)
    }

    /// 500 credits with a 30 day subscription, sold to everyone
    pub async fn monthly_plan(service: &CreditService) -> Result<Package> {
        Ok(service
            .catalog()
            .create_package(
                PackageSpec::new("Monthly", 500, 0, 3000, Audience::Both).with_validity_days(30),
            )
            .await?)
    }

    pub async fn teacher(service: &CreditService, id: &str) -> Result<()> {
        service.ledger().open_account(id, AccountRole::Teacher).await?;
        Ok(())
    }

    pub async fn guardian(service: &CreditService, id: &str) -> Result<()> {
        service.ledger().open_account(id, AccountRole::Guardian).await?;
        Ok(())
    }

    /// Create and settle an order, returning the settled order
    pub async fn settled_purchase(
        service: &CreditService,
        account_id: &str,
        package: &Package,
    ) -> Result<PurchaseOrder> {
        let order = service.orders().create_order(account_id, package.id).await?;
        Ok(service
            .orders()
            .confirm_payment(&order.payment_ref, PaymentOutcome::Succeeded)
            .await?)
    }
}

/// Fail the test if the ledger integrity check finds anything
pub async fn assert_ledger_consistent(service: &CreditService) -> Result<()> {
    let report = service.verify_integrity().await?;
    assert!(
        report.is_valid(),
        "ledger integrity issues: {:?}",
        report.issues
    );
    Ok(())
}
