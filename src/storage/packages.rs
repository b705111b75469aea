use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::domain::{Audience, Package, PackageId};

use super::repository::{ts, PACKAGE_COLUMNS};
use super::Repository;

impl Repository {
    // ========================
    // Package operations
    // ========================

    /// Save a new package to the database.
    pub async fn save_package(&self, package: &Package) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO packages (package_id, name, base_credits, bonus_credits, price, audience, active, validity_days, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(package.id.to_string())
        .bind(&package.name)
        .bind(package.base_credits)
        .bind(package.bonus_credits)
        .bind(package.price)
        .bind(package.audience.as_str())
        .bind(package.active)
        .bind(package.validity_days.map(i64::from))
        .bind(ts(package.created_at))
        .bind(ts(package.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save package")?;
        Ok(())
    }

    /// Overwrite the editable fields of a package.
    pub async fn update_package(&self, package: &Package) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE packages
            SET name = ?, base_credits = ?, bonus_credits = ?, price = ?, audience = ?, validity_days = ?, updated_at = ?
            WHERE package_id = ?
            "#,
        )
        .bind(&package.name)
        .bind(package.base_credits)
        .bind(package.bonus_credits)
        .bind(package.price)
        .bind(package.audience.as_str())
        .bind(package.validity_days.map(i64::from))
        .bind(ts(package.updated_at))
        .bind(package.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update package")?;
        Ok(())
    }

    /// Flip the active flag. Returns false if the package does not exist.
    pub async fn set_package_active(
        &self,
        id: PackageId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE packages SET active = ?, updated_at = ? WHERE package_id = ?")
                .bind(active)
                .bind(ts(at))
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .context("Failed to update package status")?;
        Ok(result.rows_affected() > 0)
    }

    /// Get a package by ID.
    pub async fn get_package(&self, id: PackageId) -> Result<Option<Package>> {
        let query = format!("SELECT {} FROM packages WHERE package_id = ?", PACKAGE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch package")?;

        row.as_ref().map(Self::row_to_package).transpose()
    }

    /// List packages, optionally limited to one audience (which includes `both`).
    pub async fn list_packages(
        &self,
        audience: Option<Audience>,
        active_only: bool,
    ) -> Result<Vec<Package>> {
        let mut query = format!("SELECT {} FROM packages WHERE 1=1", PACKAGE_COLUMNS);
        match audience {
            Some(Audience::Both) => query.push_str(" AND audience = 'both'"),
            Some(_) => query.push_str(" AND audience IN (?, 'both')"),
            None => {}
        }
        if active_only {
            query.push_str(" AND active = 1");
        }
        query.push_str(" ORDER BY price, name");

        let mut sql_query = sqlx::query(&query);
        if let Some(audience) = audience.filter(|a| *a != Audience::Both) {
            sql_query = sql_query.bind(audience.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list packages")?;

        rows.iter().map(Self::row_to_package).collect()
    }
}
