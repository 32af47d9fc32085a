//! Deciding which run an invocation belongs to.

use crate::error::{ConfigurationError, RunError};
use chrono::Utc;
use issuetree_core::RunStatus;
use issuetree_ledger::Ledger;
use tracing::info;

/// What the caller asked for.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub input_file: String,
    pub input_hash: String,
    pub repository: String,
    /// Explicit run to continue.
    pub resume: Option<String>,
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRun {
    pub run_id: String,
    /// Existing records for this run id are skipped.
    pub resuming: bool,
}

/// Fresh, time-sortable run id: `YYYYMMDDTHHMMSS-xxxxxxxx`.
pub fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

/// Pick the run to use, creating or reopening it unless this is a dry run.
///
/// With an explicit resume id the run must exist and not be completed; a
/// failed run is put back in progress. Otherwise the latest run for the same
/// input hash decides: completed without `force` is refused, in progress is
/// continued, anything else starts fresh.
pub fn resolve_run(ledger: &Ledger, request: &RunRequest) -> Result<ResolvedRun, RunError> {
    if let Some(run_id) = &request.resume {
        let run = ledger
            .get_run(run_id)?
            .ok_or_else(|| ConfigurationError::RunNotFound(run_id.clone()))?;
        match run.status {
            RunStatus::Completed => {
                return Err(ConfigurationError::AlreadyCompleted(run_id.clone()).into());
            }
            RunStatus::Failed if !request.dry_run => ledger.reopen_run(run_id)?,
            _ => {}
        }
        info!(run_id = %run.run_id, status = %run.status, "resuming run");
        return Ok(ResolvedRun {
            run_id: run.run_id,
            resuming: true,
        });
    }

    if let Some(previous) = ledger.get_run_by_hash(&request.input_hash)? {
        match previous.status {
            RunStatus::Completed if !request.force => {
                return Err(ConfigurationError::InputAlreadyProcessed {
                    run_id: previous.run_id,
                }
                .into());
            }
            RunStatus::InProgress => {
                info!(run_id = %previous.run_id, "found interrupted run for this input, resuming");
                return Ok(ResolvedRun {
                    run_id: previous.run_id,
                    resuming: true,
                });
            }
            _ => {}
        }
    }

    let run_id = new_run_id();
    if !request.dry_run {
        ledger.create_run(&run_id, &request.input_file, &request.input_hash, &request.repository)?;
        info!(run_id, repository = %request.repository, "starting new run");
    }
    Ok(ResolvedRun {
        run_id,
        resuming: false,
    })
}
