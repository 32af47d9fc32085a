//! issuetree - create hierarchical GitHub issues from a declarative batch
//!
//! The binary wires these together with the workspace crates:
//! `issuetree-core` (model, graph, fingerprints), `issuetree-ledger` (SQLite
//! run ledger), `issuetree-tracker` (tracker contract, retries, GitHub) and
//! `issuetree-executor` (run resolution and orchestration).

pub mod config;
pub mod logging;

pub use config::Config;
