use issuetree_core::RunStatus;
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run already exists: {0}")]
    RunExists(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("issue '{local_id}' already recorded for run {run_id}")]
    DuplicateItem { run_id: String, local_id: String },

    #[error("issue '{local_id}' not recorded for run {run_id}")]
    ItemNotFound { run_id: String, local_id: String },

    #[error("run {run_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },
}

impl LedgerError {
    pub fn duplicate_item(run_id: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self::DuplicateItem {
            run_id: run_id.into(),
            local_id: local_id.into(),
        }
    }

    pub fn item_not_found(run_id: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self::ItemNotFound {
            run_id: run_id.into(),
            local_id: local_id.into(),
        }
    }
}
