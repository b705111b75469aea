mod common;

use anyhow::Result;
use common::test_service;
use creditbook::application::AppError;
use creditbook::domain::{Audience, PackageSpec};

#[tokio::test]
async fn test_create_and_get_package() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let package = service
        .catalog()
        .create_package(PackageSpec::new("Starter", 200, 50, 1500, Audience::Teacher))
        .await?;
    assert!(package.active);
    assert_eq!(package.total_credits(), 250);

    let stored = service.catalog().get_package(package.id).await?;
    assert_eq!(stored.name, "Starter");
    assert_eq!(stored.base_credits, 200);
    assert_eq!(stored.bonus_credits, 50);
    assert_eq!(stored.price, 1500);
    assert_eq!(stored.audience, Audience::Teacher);
    assert_eq!(stored.validity_days, None);
    Ok(())
}

#[tokio::test]
async fn test_invalid_packages_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let catalog = service.catalog();

    let invalid = [
        PackageSpec::new("", 200, 0, 100, Audience::Both),
        PackageSpec::new("Zero", 0, 0, 100, Audience::Both),
        PackageSpec::new("Negative bonus", 100, -1, 100, Audience::Both),
        PackageSpec::new("Negative price", 100, 0, -1, Audience::Both),
        PackageSpec::new("Zero days", 100, 0, 100, Audience::Both).with_validity_days(0),
        PackageSpec::new("Forever", 100, 0, 100, Audience::Both).with_validity_days(u32::MAX),
        PackageSpec::new("Overflowing", i64::MAX, 1, 100, Audience::Both),
    ];
    for spec in invalid {
        let name = spec.name.clone();
        assert!(
            matches!(catalog.create_package(spec).await, Err(AppError::Validation(_))),
            "package '{}' should be rejected",
            name
        );
    }

    assert!(catalog.list_packages(None, false).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_package() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let catalog = service.catalog();
    let package = catalog
        .create_package(PackageSpec::new("Starter", 200, 50, 1500, Audience::Teacher))
        .await?;

    let updated = catalog
        .update_package(
            package.id,
            PackageSpec::new("Starter+", 300, 0, 1800, Audience::Both).with_validity_days(14),
        )
        .await?;
    assert_eq!(updated.id, package.id);
    assert!(updated.updated_at >= package.updated_at);

    let stored = catalog.get_package(package.id).await?;
    assert_eq!(stored.name, "Starter+");
    assert_eq!(stored.price, 1800);
    assert_eq!(stored.audience, Audience::Both);
    assert_eq!(stored.validity_days, Some(14));

    let bad = catalog
        .update_package(package.id, PackageSpec::new("Starter", -5, 0, 1, Audience::Both))
        .await;
    assert!(matches!(bad, Err(AppError::Validation(_))));

    let missing = catalog
        .update_package(
            uuid::Uuid::new_v4(),
            PackageSpec::new("Ghost", 1, 0, 1, Audience::Both),
        )
        .await;
    assert!(matches!(missing, Err(AppError::PackageNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_list_packages_by_audience_and_status() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let catalog = service.catalog();

    let teacher = catalog
        .create_package(PackageSpec::new("Tutor pack", 100, 0, 900, Audience::Teacher))
        .await?;
    catalog
        .create_package(PackageSpec::new("Parent pack", 100, 0, 700, Audience::Guardian))
        .await?;
    catalog
        .create_package(PackageSpec::new("Shared pack", 100, 0, 500, Audience::Both))
        .await?;

    let for_teachers = catalog.list_packages(Some(Audience::Teacher), true).await?;
    let names: Vec<_> = for_teachers.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Shared pack", "Tutor pack"]);

    let for_guardians = catalog.list_packages(Some(Audience::Guardian), true).await?;
    assert_eq!(for_guardians.len(), 2);

    let only_both = catalog.list_packages(Some(Audience::Both), true).await?;
    assert_eq!(only_both.len(), 1);

    let deactivated = catalog.set_active(teacher.id, false).await?;
    assert!(!deactivated.active);
    assert_eq!(catalog.list_packages(Some(Audience::Teacher), true).await?.len(), 1);
    assert_eq!(catalog.list_packages(Some(Audience::Teacher), false).await?.len(), 2);
    assert_eq!(catalog.list_packages(None, false).await?.len(), 3);

    let reactivated = catalog.set_active(teacher.id, true).await?;
    assert!(reactivated.active);

    let missing = catalog.set_active(uuid::Uuid::new_v4(), true).await;
    assert!(matches!(missing, Err(AppError::PackageNotFound(_))));
    Ok(())
}
