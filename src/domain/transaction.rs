use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Credits};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credits earned on the platform (referrals, completed tuition)
    Earned,
    /// Credits consumed by an action such as publishing a post
    Spent,
    /// Credits granted by a settled package purchase
    Purchased,
    /// Compensation of an earlier purchase
    Refund,
    /// Promotional credits
    Bonus,
    /// Manual operator correction
    Adjustment,
}

impl TransactionType {
    pub const ALL: [TransactionType; 6] = [
        TransactionType::Earned,
        TransactionType::Spent,
        TransactionType::Purchased,
        TransactionType::Refund,
        TransactionType::Bonus,
        TransactionType::Adjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Earned => "earned",
            TransactionType::Spent => "spent",
            TransactionType::Purchased => "purchased",
            TransactionType::Refund => "refund",
            TransactionType::Bonus => "bonus",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "earned" => Some(TransactionType::Earned),
            "spent" => Some(TransactionType::Spent),
            "purchased" => Some(TransactionType::Purchased),
            "refund" => Some(TransactionType::Refund),
            "bonus" => Some(TransactionType::Bonus),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }

    /// Sign rule for amounts of this type. Zero is never accepted here;
    /// capped refunds are the single place a zero amount can reach the log.
    pub fn accepts(&self, amount: Credits) -> bool {
        match self {
            TransactionType::Earned | TransactionType::Purchased | TransactionType::Bonus => {
                amount > 0
            }
            TransactionType::Spent => amount < 0,
            TransactionType::Refund | TransactionType::Adjustment => amount != 0,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    /// Netted out together with the entry that fully compensated it
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Reversed => "reversed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TransactionStatus::Completed),
            "reversed" => Some(TransactionStatus::Reversed),
            _ => None,
        }
    }
}

/// Reference to the business object an entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub kind: String,
    pub id: String,
}

impl RelatedEntity {
    pub const PURCHASE_ORDER: &'static str = "purchase_order";
    pub const ADMIN_ADJUSTMENT: &'static str = "admin_adjustment";

    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn purchase_order(order_id: impl ToString) -> Self {
        Self::new(Self::PURCHASE_ORDER, order_id.to_string())
    }

    pub fn admin(actor_id: impl Into<String>) -> Self {
        Self::new(Self::ADMIN_ADJUSTMENT, actor_id)
    }
}

impl std::fmt::Display for RelatedEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// An immutable, signed ledger entry.
/// Amount, account and balance_after never change once written; corrections are new entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Global append order, assigned by the repository
    pub sequence: i64,
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    /// Signed amount, negative for debits
    pub amount: Credits,
    /// Account balance right after this entry was applied
    pub balance_after: Credits,
    pub reason: String,
    pub related_entity: Option<RelatedEntity>,
    /// Audit detail (refund shortfall, adjustment actor, payment reference)
    pub metadata: serde_json::Value,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// A request to append an entry. The ledger store turns it into a `Transaction`.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    pub amount: Credits,
    pub reason: String,
    pub related_entity: Option<RelatedEntity>,
    pub metadata: serde_json::Value,
}

impl NewEntry {
    pub fn new(
        account_id: impl Into<AccountId>,
        transaction_type: TransactionType,
        amount: Credits,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            transaction_type,
            amount,
            reason: reason.into(),
            related_entity: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_related(mut self, related: RelatedEntity) -> Self {
        self.related_entity = Some(related);
        self
    }

    pub fn with_related_opt(mut self, related: Option<RelatedEntity>) -> Self {
        self.related_entity = related;
        self
    }

    /// Add one key to the metadata object.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Check the sign rule of the entry type.
    pub fn validate(&self) -> Result<(), String> {
        if self.account_id.trim().is_empty() {
            return Err("account id must not be empty".to_string());
        }
        if self.amount == Credits::MIN {
            return Err(format!("amount {} is out of range", self.amount));
        }
        if !self.transaction_type.accepts(self.amount) {
            return Err(format!(
                "amount {} is not valid for a '{}' transaction",
                self.amount, self.transaction_type
            ));
        }
        Ok(())
    }

    /// Materialize the entry once the store knows the resulting balance.
    pub fn into_transaction(self, amount: Credits, balance_after: Credits) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by repository
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount,
            balance_after,
            reason: self.reason,
            related_entity: self.related_entity,
            metadata: self.metadata,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }
}
