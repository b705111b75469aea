use async_trait::async_trait;

use crate::domain::{Credits, OrderId};

/// What the orchestrator hands to the payment provider to start collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub order_id: OrderId,
    pub price_charged: Credits,
    pub payment_ref: String,
}

/// Payment provider boundary. Confirmations come back later through
/// `PurchaseOrchestrator::confirm_payment`, possibly more than once.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &GatewayRequest) -> anyhow::Result<()>;
}

/// Accepts every hand-off. Used when confirmations are entered by an operator
/// or by a separate callback handler.
#[derive(Debug, Default, Clone)]
pub struct ManualGateway;

#[async_trait]
impl PaymentGateway for ManualGateway {
    async fn initiate(&self, request: &GatewayRequest) -> anyhow::Result<()> {
        tracing::info!(
            order_id = %request.order_id,
            payment_ref = %request.payment_ref,
            price = request.price_charged,
            "awaiting manual payment confirmation"
        );
        Ok(())
    }
}
