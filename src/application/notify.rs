use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::{AccountId, Credits, Transaction, TransactionId, TransactionType};

/// Emitted after every committed ledger append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEvent {
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub transaction_type: TransactionType,
    pub amount: Credits,
    pub balance_after: Credits,
}

impl From<&Transaction> for LedgerEvent {
    fn from(txn: &Transaction) -> Self {
        Self {
            account_id: txn.account_id.clone(),
            transaction_id: txn.id,
            transaction_type: txn.transaction_type,
            amount: txn.amount,
            balance_after: txn.balance_after,
        }
    }
}

/// Fire-and-forget sink for ledger events.
///
/// Implementations must not block and must swallow their own delivery failures:
/// the ledger write has already committed when `notify` is called.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: LedgerEvent);
}

/// Writes each event as a structured log line.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: LedgerEvent) {
        tracing::info!(
            account_id = %event.account_id,
            transaction_id = %event.transaction_id,
            transaction_type = %event.transaction_type,
            amount = event.amount,
            balance_after = event.balance_after,
            "ledger event"
        );
    }
}

/// Forwards events to an unbounded channel, typically drained by a delivery task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<LedgerEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::UnboundedSender<LedgerEvent>) -> Self {
        Self { sender }
    }

    /// Build a notifier together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: LedgerEvent) {
        if let Err(err) = self.sender.send(event) {
            tracing::warn!(
                transaction_id = %err.0.transaction_id,
                "notification receiver dropped, event discarded"
            );
        }
    }
}
