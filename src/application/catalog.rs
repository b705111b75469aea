use chrono::Utc;

use crate::domain::{Audience, Package, PackageId, PackageSpec};
use crate::storage::Repository;

use super::AppError;

/// Admin-managed list of purchasable credit packages.
///
/// Orders snapshot price and credits when they are created, so nothing here
/// ever reaches back into existing orders.
pub struct PackageCatalog {
    repo: Repository,
}

impl PackageCatalog {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn create_package(&self, spec: PackageSpec) -> Result<Package, AppError> {
        spec.validate().map_err(AppError::Validation)?;

        let package = Package::from_spec(spec);
        self.repo.save_package(&package).await?;
        tracing::info!(
            package_id = %package.id,
            name = %package.name,
            price = package.price,
            credits = package.total_credits(),
            "package created"
        );
        Ok(package)
    }

    pub async fn update_package(&self, id: PackageId, spec: PackageSpec) -> Result<Package, AppError> {
        spec.validate().map_err(AppError::Validation)?;

        let mut package = self.get_package(id).await?;
        package.apply(spec);
        self.repo.update_package(&package).await?;
        tracing::info!(package_id = %id, "package updated");
        Ok(package)
    }

    /// Enable or disable purchasing a package.
    pub async fn set_active(&self, id: PackageId, active: bool) -> Result<Package, AppError> {
        if !self.repo.set_package_active(id, active, Utc::now()).await? {
            return Err(AppError::PackageNotFound(id.to_string()));
        }
        tracing::info!(package_id = %id, active, "package availability changed");
        self.get_package(id).await
    }

    pub async fn get_package(&self, id: PackageId) -> Result<Package, AppError> {
        self.repo
            .get_package(id)
            .await?
            .ok_or_else(|| AppError::PackageNotFound(id.to_string()))
    }

    /// Packages for an audience (plus those offered to both), cheapest first.
    pub async fn list_packages(
        &self,
        audience: Option<Audience>,
        active_only: bool,
    ) -> Result<Vec<Package>, AppError> {
        Ok(self.repo.list_packages(audience, active_only).await?)
    }
}
