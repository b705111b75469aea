mod common;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{assert_ledger_consistent, test_service, test_service_with, Fixtures};
use creditbook::application::{AppError, ChannelNotifier, ManualGateway};
use creditbook::domain::{AccountRole, NewEntry, RelatedEntity, TransactionType};
use creditbook::storage::TransactionFilter;

#[tokio::test]
async fn test_open_account_is_idempotent() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let first = service.ledger().open_account("t-1", AccountRole::Teacher).await?;
    service
        .ledger()
        .append_transaction("t-1", TransactionType::Bonus, 30, "welcome", None)
        .await?;
    let second = service.ledger().open_account("t-1", AccountRole::Teacher).await?;

    assert_eq!(first.id, second.id);
    assert_eq!(second.balance, 30);
    assert_eq!(service.ledger().list_accounts().await?.len(), 1);

    let err = service.ledger().open_account("  ", AccountRole::Teacher).await;
    assert!(matches!(err, Err(AppError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_append_tracks_running_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();

    let earned = ledger
        .append_transaction("t-1", TransactionType::Earned, 100, "referral", None)
        .await?;
    let spent = ledger
        .append_transaction(
            "t-1",
            TransactionType::Spent,
            -40,
            "job application",
            Some(RelatedEntity::new("job_application", "17")),
        )
        .await?;

    assert_eq!(earned.balance_after, 100);
    assert_eq!(spent.balance_after, 60);
    assert!(spent.sequence > earned.sequence);
    assert_eq!(ledger.get_balance("t-1").await?, 60);

    let stored = ledger.get_transaction(spent.id).await?;
    assert_eq!(stored.amount, -40);
    assert_eq!(
        stored.related_entity,
        Some(RelatedEntity::new("job_application", "17"))
    );

    assert_ledger_consistent(&service).await
}

#[tokio::test]
async fn test_overdraw_is_rejected_without_writing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();

    ledger
        .append_transaction("t-1", TransactionType::Earned, 230, "tuition", None)
        .await?;

    let result = ledger
        .append_transaction("t-1", TransactionType::Spent, -300, "premium post", None)
        .await;
    match result {
        Err(AppError::InsufficientBalance {
            account_id,
            balance,
            required,
        }) => {
            assert_eq!(account_id, "t-1");
            assert_eq!(balance, 230);
            assert_eq!(required, 300);
        }
        other => panic!("expected InsufficientBalance, got {:?}", other),
    }

    assert_eq!(ledger.get_balance("t-1").await?, 230);
    let history = ledger
        .list_transactions("t-1", &TransactionFilter::default())
        .await?;
    assert_eq!(history.len(), 1);

    // Spending exactly the balance is allowed
    let last = ledger
        .append_transaction("t-1", TransactionType::Spent, -230, "premium post", None)
        .await?;
    assert_eq!(last.balance_after, 0);

    assert_ledger_consistent(&service).await
}

#[tokio::test]
async fn test_sign_rules_are_enforced() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();

    let cases = [
        (TransactionType::Earned, -5),
        (TransactionType::Earned, 0),
        (TransactionType::Spent, 5),
        (TransactionType::Purchased, -5),
        (TransactionType::Bonus, 0),
        (TransactionType::Adjustment, 0),
        (TransactionType::Refund, 0),
    ];
    for (kind, amount) in cases {
        let result = ledger
            .append_transaction("t-1", kind, amount, "bad", None)
            .await;
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "{} of {} should be rejected",
            kind,
            amount
        );
    }

    assert_eq!(ledger.get_balance("t-1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_amounts_outside_credit_range_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();
    ledger
        .append_transaction("t-1", TransactionType::Earned, 10, "tuition", None)
        .await?;

    let too_large = ledger
        .append_transaction("t-1", TransactionType::Earned, i64::MAX, "jackpot", None)
        .await;
    assert!(matches!(too_large, Err(AppError::Validation(_))));

    let unnegatable = ledger
        .append_transaction("t-1", TransactionType::Spent, i64::MIN, "drain", None)
        .await;
    assert!(matches!(unnegatable, Err(AppError::Validation(_))));

    let capped = ledger
        .append_capped_debit(NewEntry::new("t-1", TransactionType::Refund, i64::MIN, "reverse"))
        .await;
    assert!(matches!(capped, Err(AppError::Validation(_))));

    // A debit of the largest magnitude is an ordinary overdraw
    let huge_spend = ledger
        .append_transaction("t-1", TransactionType::Spent, -i64::MAX, "drain", None)
        .await;
    assert!(matches!(huge_spend, Err(AppError::InsufficientBalance { .. })));

    assert_eq!(ledger.get_balance("t-1").await?, 10);
    let history = ledger
        .list_transactions("t-1", &TransactionFilter::default())
        .await?;
    assert_eq!(history.len(), 1);

    assert_ledger_consistent(&service).await
}

#[tokio::test]
async fn test_unknown_and_deactivated_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let ledger = service.ledger();

    let missing = ledger
        .append_transaction("ghost", TransactionType::Bonus, 10, "promo", None)
        .await;
    assert!(matches!(missing, Err(AppError::AccountNotFound(_))));
    assert!(matches!(
        ledger.get_balance("ghost").await,
        Err(AppError::AccountNotFound(_))
    ));

    Fixtures::guardian(&service, "g-1").await?;
    ledger
        .append_transaction("g-1", TransactionType::Bonus, 10, "promo", None)
        .await?;
    let account = ledger.deactivate_account("g-1").await?;
    assert!(!account.active);
    assert!(account.deactivated_at.is_some());

    let rejected = ledger
        .append_transaction("g-1", TransactionType::Bonus, 10, "promo", None)
        .await;
    assert!(matches!(rejected, Err(AppError::AccountInactive(_))));

    // History stays readable
    let history = ledger
        .list_transactions("g-1", &TransactionFilter::default())
        .await?;
    assert_eq!(history.len(), 1);
    assert_eq!(ledger.get_balance("g-1").await?, 10);
    Ok(())
}

#[tokio::test]
async fn test_list_transactions_filters() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();

    ledger
        .append_transaction("t-1", TransactionType::Earned, 100, "Referral of Maya", None)
        .await?;
    ledger
        .append_transaction(
            "t-1",
            TransactionType::Spent,
            -10,
            "Applied to job",
            Some(RelatedEntity::new("job_application", "A-1")),
        )
        .await?;
    ledger
        .append_transaction(
            "t-1",
            TransactionType::Spent,
            -15,
            "Applied to job",
            Some(RelatedEntity::new("job_application", "B-2")),
        )
        .await?;
    ledger
        .append_transaction("t-1", TransactionType::Bonus, 5, "Weekend promo", None)
        .await?;

    // Most recent first
    let all = ledger
        .list_transactions("t-1", &TransactionFilter::default())
        .await?;
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].transaction_type, TransactionType::Bonus);
    assert!(all.windows(2).all(|w| w[0].sequence > w[1].sequence));

    let spent = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                transaction_type: Some(TransactionType::Spent),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(spent.len(), 2);

    let by_category = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                category: Some("job_application".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(by_category.len(), 2);

    let by_related_id = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                search: Some("b-2".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(by_related_id.len(), 1);
    assert_eq!(by_related_id[0].amount, -15);

    let by_reason = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                search: Some("MAYA".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(by_reason.len(), 1);

    let page = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].amount, -15);
    assert_eq!(page[1].amount, -10);

    let future_only = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                from_date: Some(Utc::now() + Duration::days(1)),
                ..Default::default()
            },
        )
        .await?;
    assert!(future_only.is_empty());

    let until_now = ledger
        .list_transactions(
            "t-1",
            &TransactionFilter {
                to_date: Some(Utc::now() + Duration::seconds(1)),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(until_now.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_capped_debit_records_shortfall() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();

    ledger
        .append_transaction("t-1", TransactionType::Earned, 30, "tuition", None)
        .await?;

    let entry = NewEntry::new("t-1", TransactionType::Refund, -50, "chargeback");
    let (txn, shortfall) = ledger.append_capped_debit(entry).await?;

    assert_eq!(txn.amount, -30);
    assert_eq!(txn.balance_after, 0);
    assert_eq!(shortfall, 20);
    assert!(txn.reason.contains("shortfall"));
    assert_eq!(txn.metadata["requested"], 50);
    assert_eq!(txn.metadata["applied"], 30);
    assert_eq!(txn.metadata["shortfall"], 20);

    assert_ledger_consistent(&service).await
}

#[tokio::test]
async fn test_committed_appends_are_notified() -> Result<()> {
    let (notifier, mut events) = ChannelNotifier::channel();
    let (service, _temp) =
        test_service_with(Arc::new(ManualGateway), Arc::new(notifier)).await?;
    Fixtures::teacher(&service, "t-1").await?;
    let ledger = service.ledger();

    let txn = ledger
        .append_transaction("t-1", TransactionType::Earned, 25, "tuition", None)
        .await?;
    let _ = ledger
        .append_transaction("t-1", TransactionType::Spent, -100, "too much", None)
        .await;

    let event = events.try_recv()?;
    assert_eq!(event.transaction_id, txn.id);
    assert_eq!(event.account_id, "t-1");
    assert_eq!(event.amount, 25);
    assert_eq!(event.balance_after, 25);

    // The rejected spend produced no event
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_account_summary() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;

    for i in 0..12 {
        service
            .ledger()
            .append_transaction("t-1", TransactionType::Earned, 10, &format!("lesson {}", i), None)
            .await?;
    }

    let summary = service.get_account_summary("t-1").await?;
    assert_eq!(summary.balance, 120);
    assert_eq!(summary.recent_transactions.len(), 10);
    assert_eq!(summary.recent_transactions[0].reason, "lesson 11");
    assert!(!summary.has_active_subscription);
    Ok(())
}
