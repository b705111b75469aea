use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    generate_payment_ref, Credits, NewEntry, OrderId, OrderStatus, PackageId,
    PaymentOutcome, PurchaseOrder, RelatedEntity, SubscriptionGrant, Transaction,
    TransactionType,
};
use crate::storage::{is_unique_violation, DebitMode, OrderLink, Repository};

use super::gateway::{GatewayRequest, PaymentGateway};
use super::ledger::{LedgerStore, LinkedAppend};
use super::AppError;

/// Result of refunding a settled order.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub order: PurchaseOrder,
    pub transaction: Transaction,
    /// Credits that could not be taken back because they were already spent
    pub shortfall: Credits,
}

impl RefundOutcome {
    pub fn is_partial(&self) -> bool {
        self.shortfall > 0
    }
}

/// Drives purchase orders from creation through settlement, failure and refund.
///
/// Settlement is keyed by `payment_ref`: the status change and the ledger entry
/// commit together behind a conditional update, so replayed confirmations are
/// absorbed instead of crediting twice.
pub struct PurchaseOrchestrator {
    ledger: Arc<LedgerStore>,
    repo: Repository,
    gateway: Arc<dyn PaymentGateway>,
}

impl PurchaseOrchestrator {
    pub fn new(ledger: Arc<LedgerStore>, repo: Repository, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            ledger,
            repo,
            gateway,
        }
    }

    // ========================
    // Order creation
    // ========================

    /// Create an order with a freshly generated payment reference.
    pub async fn create_order(
        &self,
        account_id: &str,
        package_id: PackageId,
    ) -> Result<PurchaseOrder, AppError> {
        self.create_order_with_ref(account_id, package_id, &generate_payment_ref())
            .await
    }

    /// Create an order under a payment reference supplied by the gateway.
    pub async fn create_order_with_ref(
        &self,
        account_id: &str,
        package_id: PackageId,
        payment_ref: &str,
    ) -> Result<PurchaseOrder, AppError> {
        let payment_ref = payment_ref.trim();
        if payment_ref.is_empty() {
            return Err(AppError::Validation(
                "payment reference must not be empty".to_string(),
            ));
        }

        let account = self.ledger.get_account(account_id).await?;
        if !account.active {
            return Err(AppError::AccountInactive(account.id));
        }

        let package = self
            .repo
            .get_package(package_id)
            .await?
            .ok_or_else(|| AppError::PackageNotFound(package_id.to_string()))?;
        if !package.is_available_to(account.role) {
            return Err(AppError::PackageInactive(package.name));
        }

        if self.repo.get_order_by_payment_ref(payment_ref).await?.is_some() {
            return Err(AppError::DuplicatePaymentReference(payment_ref.to_string()));
        }

        let order = PurchaseOrder::new(account.id, &package, payment_ref.to_string());
        if let Err(err) = self.repo.save_order(&order).await {
            if is_unique_violation(&err) {
                return Err(AppError::DuplicatePaymentReference(payment_ref.to_string()));
            }
            return Err(err.into());
        }
        tracing::info!(
            order_id = %order.id,
            account_id = %order.account_id,
            package_id = %package.id,
            payment_ref,
            price = order.price_charged,
            credits = order.credits_to_grant,
            "order created"
        );

        let request = GatewayRequest {
            order_id: order.id,
            price_charged: order.price_charged,
            payment_ref: order.payment_ref.clone(),
        };
        if let Err(err) = self.gateway.initiate(&request).await {
            let message = format!("{:#}", err);
            self.repo
                .transition_order(
                    order.id,
                    OrderStatus::Created,
                    OrderStatus::Failed,
                    Some(&message),
                    Utc::now(),
                )
                .await?;
            tracing::warn!(order_id = %order.id, payment_ref, error = %message, "gateway hand-off failed");
            return Err(AppError::GatewayRejected {
                order_id: order.id,
                message,
            });
        }

        // A confirmation racing the hand-off may already have advanced the order.
        self.repo
            .transition_order(
                order.id,
                OrderStatus::Created,
                OrderStatus::AwaitingPayment,
                None,
                Utc::now(),
            )
            .await?;
        self.get_order(order.id).await
    }

    // ========================
    // Settlement
    // ========================

    /// Apply a payment confirmation. Safe to call any number of times for the
    /// same reference; orders already past payment are returned unchanged.
    pub async fn confirm_payment(
        &self,
        payment_ref: &str,
        outcome: PaymentOutcome,
    ) -> Result<PurchaseOrder, AppError> {
        let order = self.get_order_by_payment_ref(payment_ref).await?;
        if order.status.is_settlement_final() {
            tracing::info!(
                order_id = %order.id,
                payment_ref,
                status = %order.status,
                "duplicate payment confirmation absorbed"
            );
            return Ok(order);
        }

        if order.status == OrderStatus::Created {
            self.repo
                .transition_order(
                    order.id,
                    OrderStatus::Created,
                    OrderStatus::AwaitingPayment,
                    None,
                    Utc::now(),
                )
                .await?;
        }

        match outcome {
            PaymentOutcome::Succeeded => self.settle(&order).await?,
            PaymentOutcome::Failed { reason } => {
                let moved = self
                    .repo
                    .transition_order(
                        order.id,
                        OrderStatus::AwaitingPayment,
                        OrderStatus::Failed,
                        Some(&reason),
                        Utc::now(),
                    )
                    .await?;
                if moved {
                    tracing::info!(order_id = %order.id, payment_ref, reason = %reason, "payment failed");
                } else {
                    tracing::info!(order_id = %order.id, payment_ref, "late failure notice absorbed");
                }
            }
        }

        self.get_order(order.id).await
    }

    async fn settle(&self, order: &PurchaseOrder) -> Result<(), AppError> {
        let entry = NewEntry::new(
            order.account_id.clone(),
            TransactionType::Purchased,
            order.credits_to_grant,
            format!("Package purchase ({} credits)", order.credits_to_grant),
        )
        .with_related(RelatedEntity::purchase_order(order.id))
        .with_meta("payment_ref", order.payment_ref.clone())
        .with_meta("package_id", order.package_id.to_string())
        .with_meta("price_charged", order.price_charged);

        let subscription = order.validity_days.map(|validity_days| SubscriptionGrant {
            plan_id: order.package_id,
            validity_days,
        });
        let link = OrderLink::new(order.id, OrderStatus::AwaitingPayment, OrderStatus::Settled)
            .settlement(subscription);

        match self.ledger.append_linked(entry, DebitMode::Strict, &link).await? {
            LinkedAppend::Applied { transaction, .. } => {
                tracing::info!(
                    order_id = %order.id,
                    payment_ref = %order.payment_ref,
                    transaction_id = %transaction.id,
                    credits = transaction.amount,
                    "order settled"
                );
            }
            LinkedAppend::Stale => {
                tracing::info!(
                    order_id = %order.id,
                    payment_ref = %order.payment_ref,
                    "concurrent payment confirmation absorbed"
                );
            }
        }
        Ok(())
    }

    // ========================
    // Refunds and cancellation
    // ========================

    /// Refund a settled order, taking back at most the account's current balance.
    pub async fn refund_order(&self, order_id: OrderId, reason: &str) -> Result<RefundOutcome, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::Validation("refund reason must not be empty".to_string()));
        }

        let order = self.get_order(order_id).await?;
        order
            .status
            .transition(OrderStatus::Refunded)
            .map_err(|err| AppError::not_transitionable(order_id, err))?;

        let entry = NewEntry::new(
            order.account_id.clone(),
            TransactionType::Refund,
            -order.credits_to_grant,
            reason.trim(),
        )
        .with_related(RelatedEntity::purchase_order(order.id))
        .with_meta("payment_ref", order.payment_ref.clone());
        let link = OrderLink::new(order.id, OrderStatus::Settled, OrderStatus::Refunded)
            .reversing(order.settlement_transaction_id);

        match self
            .ledger
            .append_linked(entry, DebitMode::CapAtBalance, &link)
            .await?
        {
            LinkedAppend::Applied {
                transaction,
                shortfall,
            } => {
                if shortfall > 0 {
                    tracing::warn!(
                        order_id = %order_id,
                        account_id = %order.account_id,
                        requested = order.credits_to_grant,
                        shortfall,
                        "refund capped at available balance"
                    );
                } else {
                    tracing::info!(order_id = %order_id, account_id = %order.account_id, "order refunded");
                }
                Ok(RefundOutcome {
                    order: self.get_order(order_id).await?,
                    transaction,
                    shortfall,
                })
            }
            LinkedAppend::Stale => {
                let current = self.get_order(order_id).await?;
                Err(AppError::OrderNotTransitionable {
                    order_id,
                    from: current.status,
                    to: OrderStatus::Refunded,
                })
            }
        }
    }

    /// Administratively fail an order that has not been paid.
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<PurchaseOrder, AppError> {
        let order = self.get_order(order_id).await?;
        order
            .status
            .transition(OrderStatus::Failed)
            .map_err(|err| AppError::not_transitionable(order_id, err))?;

        let reason = match reason.trim() {
            "" => "cancelled",
            r => r,
        };
        let moved = self
            .repo
            .transition_order(order_id, order.status, OrderStatus::Failed, Some(reason), Utc::now())
            .await?;
        let current = self.get_order(order_id).await?;
        if !moved && current.status != OrderStatus::Failed {
            return Err(AppError::OrderNotTransitionable {
                order_id,
                from: current.status,
                to: OrderStatus::Failed,
            });
        }
        tracing::info!(order_id = %order_id, reason, "order cancelled");
        Ok(current)
    }

    // ========================
    // Queries
    // ========================

    pub async fn get_order(&self, order_id: OrderId) -> Result<PurchaseOrder, AppError> {
        self.repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))
    }

    pub async fn get_order_by_payment_ref(&self, payment_ref: &str) -> Result<PurchaseOrder, AppError> {
        self.repo
            .get_order_by_payment_ref(payment_ref.trim())
            .await?
            .ok_or_else(|| AppError::OrderNotFound(payment_ref.to_string()))
    }

    /// Orders, newest first.
    pub async fn list_orders(
        &self,
        account_id: Option<&str>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<PurchaseOrder>, AppError> {
        Ok(self.repo.list_orders(account_id, status).await?)
    }
}
