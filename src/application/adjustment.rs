use std::sync::Arc;

use crate::domain::{Credits, NewEntry, RelatedEntity, Transaction, TransactionType};
use crate::storage::TransactionFilter;

use super::ledger::LedgerStore;
use super::AppError;

/// Manual balance corrections by administrators.
///
/// Every correction is an `adjustment` entry that names the acting admin, so
/// the audit trail is just a filtered view of the ledger.
pub struct AdminAdjustments {
    ledger: Arc<LedgerStore>,
}

impl AdminAdjustments {
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Grant (`delta > 0`) or deduct (`delta < 0`) credits.
    pub async fn adjust_balance(
        &self,
        account_id: &str,
        delta: Credits,
        reason: &str,
        actor_id: &str,
    ) -> Result<Transaction, AppError> {
        let reason = reason.trim();
        let actor_id = actor_id.trim();
        if reason.is_empty() {
            return Err(AppError::Validation(
                "adjustment reason must not be empty".to_string(),
            ));
        }
        if actor_id.is_empty() {
            return Err(AppError::Validation(
                "adjustment actor must not be empty".to_string(),
            ));
        }
        if delta == 0 {
            return Err(AppError::Validation(
                "adjustment delta must not be zero".to_string(),
            ));
        }

        let direction = if delta > 0 { "grant" } else { "deduction" };
        let entry = NewEntry::new(account_id, TransactionType::Adjustment, delta, reason)
            .with_related(RelatedEntity::admin(actor_id))
            .with_meta("actor_id", actor_id)
            .with_meta("direction", direction);

        let transaction = self.ledger.append(entry).await?;
        tracing::info!(
            account_id,
            actor_id,
            delta,
            direction,
            transaction_id = %transaction.id,
            "balance adjusted"
        );
        Ok(transaction)
    }

    /// Adjustments made to an account, most recent first.
    pub async fn list_adjustments(&self, account_id: &str) -> Result<Vec<Transaction>, AppError> {
        let filter = TransactionFilter {
            transaction_type: Some(TransactionType::Adjustment),
            ..Default::default()
        };
        self.ledger.list_transactions(account_id, &filter).await
    }
}
