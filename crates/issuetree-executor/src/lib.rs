//! issuetree executor - run resolution, orchestration, batch runner
//!
//! Turns a validated batch into tracker issues, one at a time in parent-first
//! order, with every side effect recorded in the ledger as it happens.

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod runner;

pub use error::{ConfigurationError, RunError};
pub use orchestrator::{Orchestration, Orchestrator, OrchestratorOptions};
pub use plan::{new_run_id, resolve_run, ResolvedRun, RunRequest};
pub use report::{format_duration, Outcome, RunReport};
pub use runner::{BatchRunner, ResourceCheck, RunFlags, RunnerOptions};
