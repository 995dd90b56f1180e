pub mod client;
pub mod collect;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod session;

pub use error::{LedgerError, Result};
