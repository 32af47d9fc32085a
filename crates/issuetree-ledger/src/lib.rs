//! issuetree ledger - persistent record of runs and created issues
//!
//! Backs idempotent resume and cross-run duplicate detection.

pub mod error;
pub mod ledger;
mod schema;

pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
