// Application layer: use cases built on the domain model and the repository.

pub mod adjustment;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod locks;
pub mod notify;
pub mod purchase;
pub mod reporting;
pub mod retry;
pub mod service;

pub use adjustment::AdminAdjustments;
pub use catalog::PackageCatalog;
pub use error::*;
pub use gateway::{GatewayRequest, ManualGateway, PaymentGateway};
pub use ledger::LedgerStore;
pub use notify::{ChannelNotifier, LedgerEvent, Notifier, TracingNotifier};
pub use purchase::{PurchaseOrchestrator, RefundOutcome};
pub use reporting::*;
pub use retry::RetryPolicy;
pub use service::*;
