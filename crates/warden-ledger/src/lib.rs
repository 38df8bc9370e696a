pub mod ledger;
pub mod store;
pub mod verify;

pub use ledger::Ledger;
pub use store::LedgerDb;
