mod account;
mod ledger;
mod money;
mod order;
mod package;
mod transaction;

pub use account::*;
pub use ledger::*;
pub use money::*;
pub use order::*;
pub use package::*;
pub use transaction::*;
