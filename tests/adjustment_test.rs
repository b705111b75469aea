mod common;

use anyhow::Result;
use common::{assert_ledger_consistent, test_service, Fixtures};
use creditbook::application::AppError;
use creditbook::domain::{RelatedEntity, TransactionType};

#[tokio::test]
async fn test_adjustment_deduction_records_actor() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let package = Fixtures::starter_package(&service).await?;
    Fixtures::settled_purchase(&service, "t-1", &package).await?;
    service
        .ledger()
        .append_transaction("t-1", TransactionType::Spent, -20, "post", None)
        .await?;

    let txn = service
        .adjustments()
        .adjust_balance("t-1", -50, "duplicate promo credit", "admin1")
        .await?;

    assert_eq!(txn.transaction_type, TransactionType::Adjustment);
    assert_eq!(txn.amount, -50);
    assert_eq!(txn.balance_after, 180);
    assert_eq!(txn.related_entity, Some(RelatedEntity::admin("admin1")));
    assert_eq!(txn.metadata["actor_id"], "admin1");
    assert_eq!(txn.metadata["direction"], "deduction");
    assert_eq!(service.ledger().get_balance("t-1").await?, 180);

    assert_ledger_consistent(&service).await
}

#[tokio::test]
async fn test_adjustment_grant() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::guardian(&service, "g-1").await?;

    let txn = service
        .adjustments()
        .adjust_balance("g-1", 75, "goodwill after outage", "support-7")
        .await?;
    assert_eq!(txn.amount, 75);
    assert_eq!(txn.metadata["direction"], "grant");
    assert_eq!(service.ledger().get_balance("g-1").await?, 75);
    Ok(())
}

#[tokio::test]
async fn test_adjustment_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let adjustments = service.adjustments();

    assert!(matches!(
        adjustments.adjust_balance("t-1", 10, "   ", "admin1").await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        adjustments.adjust_balance("t-1", 10, "reason", "").await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        adjustments.adjust_balance("t-1", 0, "reason", "admin1").await,
        Err(AppError::Validation(_))
    ));

    // Deductions cannot overdraw
    let overdraw = adjustments.adjust_balance("t-1", -1, "reason", "admin1").await;
    assert!(matches!(
        overdraw,
        Err(AppError::InsufficientBalance { balance: 0, required: 1, .. })
    ));
    assert_eq!(service.ledger().get_balance("t-1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_list_adjustments_is_audit_trail() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    service
        .ledger()
        .append_transaction("t-1", TransactionType::Earned, 100, "tuition", None)
        .await?;
    service
        .adjustments()
        .adjust_balance("t-1", 10, "first", "admin1")
        .await?;
    service
        .adjustments()
        .adjust_balance("t-1", -5, "second", "admin2")
        .await?;

    let trail = service.adjustments().list_adjustments("t-1").await?;
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].reason, "second");
    assert_eq!(trail[0].related_entity, Some(RelatedEntity::admin("admin2")));
    assert_eq!(trail[1].reason, "first");
    Ok(())
}
