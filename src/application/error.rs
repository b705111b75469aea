use thiserror::Error;

use crate::domain::{Credits, OrderId, OrderStatus, TransitionError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient balance in account {account_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_id: String,
        balance: Credits,
        required: Credits,
    },

    #[error("Package is not available for purchase: {0}")]
    PackageInactive(String),

    #[error("Payment reference already used: {0}")]
    DuplicatePaymentReference(String),

    #[error("Order {order_id} cannot move from {from} to {to}")]
    OrderNotTransitionable {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Concurrent update conflict on account {0}, retries exhausted")]
    ConcurrencyConflict(String),

    #[error("Storage unavailable after {attempts} attempts: {message}")]
    StorageUnavailable { attempts: usize, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account is deactivated: {0}")]
    AccountInactive(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Payment gateway rejected order {order_id}: {message}")]
    GatewayRejected { order_id: OrderId, message: String },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub(crate) fn not_transitionable(order_id: OrderId, err: TransitionError) -> Self {
        AppError::OrderNotTransitionable {
            order_id,
            from: err.from,
            to: err.to,
        }
    }
}
