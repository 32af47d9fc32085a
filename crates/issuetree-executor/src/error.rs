use issuetree_core::{InputError, StructuralError};
use issuetree_ledger::LedgerError;
use thiserror::Error;

/// The requested run cannot be started or continued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run {0} is already completed and cannot be resumed")]
    AlreadyCompleted(String),

    #[error("input already processed by completed run {run_id}; use --force to run it again")]
    InputAlreadyProcessed { run_id: String },
}

/// Everything that aborts a batch. Per-item tracker failures never show up here.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
