use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Credits, Package, PackageId, TransactionId};

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    AwaitingPayment,
    Settled,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Created,
        OrderStatus::AwaitingPayment,
        OrderStatus::Settled,
        OrderStatus::Failed,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Settled => "settled",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(OrderStatus::Created),
            "awaiting_payment" | "awaiting-payment" | "pending" => {
                Some(OrderStatus::AwaitingPayment)
            }
            "settled" => Some(OrderStatus::Settled),
            "failed" => Some(OrderStatus::Failed),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    /// The transition table. Anything not listed here is illegal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, AwaitingPayment)
                | (Created, Failed)
                | (AwaitingPayment, Settled)
                | (AwaitingPayment, Failed)
                | (Settled, Refunded)
        )
    }

    pub fn transition(&self, next: OrderStatus) -> Result<OrderStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: *self,
                to: next,
            })
        }
    }

    /// Settlement callbacks are absorbed once the order reached one of these.
    pub fn is_settlement_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Settled | OrderStatus::Failed | OrderStatus::Refunded
        )
    }

    /// No transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order cannot move from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Result reported by the payment gateway for one payment reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        PaymentOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// One attempt to buy a package. Price, credits and validity are snapshots
/// taken at creation, so later catalog edits never change what was bought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: OrderId,
    pub account_id: AccountId,
    pub package_id: PackageId,
    pub price_charged: Credits,
    pub credits_to_grant: Credits,
    pub validity_days: Option<u32>,
    /// Gateway correlation id, unique across all orders
    pub payment_ref: String,
    pub status: OrderStatus,
    pub settlement_transaction_id: Option<TransactionId>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn new(account_id: impl Into<AccountId>, package: &Package, payment_ref: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            package_id: package.id,
            price_charged: package.price,
            credits_to_grant: package.total_credits(),
            validity_days: package.validity_days,
            payment_ref,
            status: OrderStatus::Created,
            settlement_transaction_id: None,
            failure_reason: None,
            created_at: now,
            settled_at: None,
            updated_at: now,
        }
    }
}

/// Fresh gateway correlation id.
pub fn generate_payment_ref() -> String {
    format!("pay_{}", Uuid::new_v4().simple())
}
