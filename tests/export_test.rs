mod common;

use anyhow::Result;
use common::{test_service, Fixtures};
use creditbook::domain::TransactionType;
use creditbook::io::{DatabaseSnapshot, Exporter};

fn csv_records(bytes: &[u8]) -> Result<Vec<csv::StringRecord>> {
    let mut reader = csv::Reader::from_reader(bytes);
    Ok(reader.records().collect::<Result<Vec<_>, _>>()?)
}

#[tokio::test]
async fn test_export_transactions_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    Fixtures::teacher(&service, "t-2").await?;
    let package = Fixtures::starter_package(&service).await?;
    Fixtures::settled_purchase(&service, "t-1", &package).await?;
    service
        .ledger()
        .append_transaction("t-1", TransactionType::Spent, -20, "post, featured", None)
        .await?;
    service
        .ledger()
        .append_transaction("t-2", TransactionType::Bonus, 5, "welcome", None)
        .await?;

    let exporter = Exporter::new(&service);

    let mut all = Vec::new();
    assert_eq!(exporter.export_transactions_csv(&mut all, None).await?, 3);
    assert_eq!(csv_records(&all)?.len(), 3);

    let mut one = Vec::new();
    assert_eq!(exporter.export_transactions_csv(&mut one, Some("t-1")).await?, 2);
    let rows = csv_records(&one)?;
    assert_eq!(&rows[0][4], "purchased");
    assert_eq!(&rows[0][6], "250");
    assert_eq!(&rows[0][9], "purchase_order");
    assert_eq!(&rows[1][4], "spent");
    assert_eq!(&rows[1][8], "post, featured");
    assert_eq!(&rows[1][6], "230");
    Ok(())
}

#[tokio::test]
async fn test_export_orders_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    let package = Fixtures::starter_package(&service).await?;
    let settled = Fixtures::settled_purchase(&service, "t-1", &package).await?;
    service.orders().create_order("t-1", package.id).await?;

    let mut out = Vec::new();
    assert_eq!(Exporter::new(&service).export_orders_csv(&mut out).await?, 2);

    let rows = csv_records(&out)?;
    let settled_row = rows
        .iter()
        .find(|r| &r[0] == settled.id.to_string().as_str())
        .expect("settled order exported");
    assert_eq!(&settled_row[4], "settled");
    assert_eq!(&settled_row[6], "250");
    assert!(!settled_row[8].is_empty());
    Ok(())
}

#[tokio::test]
async fn test_export_full_json_snapshot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Fixtures::teacher(&service, "t-1").await?;
    Fixtures::guardian(&service, "g-1").await?;
    let package = Fixtures::monthly_plan(&service).await?;
    Fixtures::settled_purchase(&service, "g-1", &package).await?;

    let mut out = Vec::new();
    let snapshot = Exporter::new(&service).export_full_json(&mut out).await?;
    assert_eq!(snapshot.accounts.len(), 2);
    assert_eq!(snapshot.packages.len(), 1);
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.transactions.len(), 1);

    let parsed: DatabaseSnapshot = serde_json::from_slice(&out)?;
    assert_eq!(parsed.version, snapshot.version);
    assert_eq!(parsed.transactions[0].id, snapshot.transactions[0].id);
    assert_eq!(parsed.orders[0].status, snapshot.orders[0].status);
    Ok(())
}
