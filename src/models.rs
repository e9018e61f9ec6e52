pub mod ledger;
pub mod packages;
pub mod tasks;
pub mod users;
pub mod withdrawals;
