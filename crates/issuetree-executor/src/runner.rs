//! Batch runner: validation, run resolution, orchestration, terminal status.

use crate::error::RunError;
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::plan::{resolve_run, RunRequest};
use crate::report::RunReport;
use chrono::Utc;
use issuetree_core::{hash_file, BatchInput, InputError, Item, RunStatus};
use issuetree_ledger::Ledger;
use issuetree_tracker::ResilientTracker;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct RunnerOptions {
    /// Create labels the repository does not have yet.
    pub create_missing_labels: bool,
}

/// Per-invocation switches.
#[derive(Clone, Debug, Default)]
pub struct RunFlags {
    pub dry_run: bool,
    pub force: bool,
    pub resume: Option<String>,
}

/// Milestones and labels the batch uses but the repository lacks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceCheck {
    pub missing_milestones: Vec<String>,
    pub missing_labels: Vec<String>,
    pub created_labels: Vec<String>,
}

pub struct BatchRunner {
    ledger: Ledger,
    tracker: ResilientTracker,
    options: RunnerOptions,
}

impl BatchRunner {
    pub fn new(ledger: Ledger, tracker: ResilientTracker, options: RunnerOptions) -> Self {
        Self {
            ledger,
            tracker,
            options,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Load, hash and run an input file.
    pub async fn run_file(&self, path: &Path, flags: &RunFlags) -> Result<RunReport, RunError> {
        let input = BatchInput::from_path(path)?;
        let hash = hash_file(path).map_err(InputError::from)?;
        self.run_input(&input, &path.display().to_string(), &hash, flags).await
    }

    pub async fn run_input(
        &self,
        input: &BatchInput,
        input_file: &str,
        input_hash: &str,
        flags: &RunFlags,
    ) -> Result<RunReport, RunError> {
        let started = Utc::now();
        let graph = input.build_graph()?;
        let order = graph.topological_sort()?;
        info!(
            repository = %input.repository,
            issues = graph.len(),
            roots = graph.roots().len(),
            dry_run = flags.dry_run,
            "batch validated"
        );

        let resolved = resolve_run(
            &self.ledger,
            &RunRequest {
                input_file: input_file.to_string(),
                input_hash: input_hash.to_string(),
                repository: input.repository.clone(),
                resume: flags.resume.clone(),
                force: flags.force,
                dry_run: flags.dry_run,
            },
        )?;
        let run_id = resolved.run_id.as_str();

        if !flags.dry_run {
            let items: Vec<Item> = graph.items().cloned().collect();
            self.check_resources(&items).await;
        }

        let orchestrator = Orchestrator::new(
            &self.ledger,
            &self.tracker,
            &input.repository,
            OrchestratorOptions {
                force: flags.force,
                dry_run: flags.dry_run,
                resuming: resolved.resuming,
            },
        );

        let outcome = match orchestrator.execute(run_id, &graph, &order).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(run_id, error = %e, "ledger failure, aborting run");
                if !flags.dry_run {
                    self.mark_failed(run_id);
                }
                return Err(e.into());
            }
        };

        if !flags.dry_run {
            if let Err(e) = self.ledger.mark_run_complete(run_id, RunStatus::Completed) {
                error!(run_id, error = %e, "could not mark run completed");
                self.mark_failed(run_id);
                return Err(e.into());
            }
        }

        let report = RunReport::new(
            run_id,
            &input.repository,
            outcome.counters,
            outcome.failed_ids,
            flags.dry_run,
            started,
        );
        info!(run_id, outcome = %report.outcome, "run complete");
        Ok(report)
    }

    /// Best effort. If this write fails too the run stays `in_progress`,
    /// which resolution picks up again on the next invocation.
    fn mark_failed(&self, run_id: &str) {
        if let Err(e) = self.ledger.mark_run_complete(run_id, RunStatus::Failed) {
            error!(run_id, error = %e, "could not mark run failed");
        }
    }

    /// List the tracker's milestones and labels and report what the batch
    /// needs but the repository lacks. Listing failures are logged only.
    pub async fn check_resources(&self, items: &[Item]) -> ResourceCheck {
        let mut check = ResourceCheck::default();
        let tracker = self.tracker.inner();

        let wanted_milestones: BTreeSet<&str> = items.iter().filter_map(|i| i.milestone.as_deref()).collect();
        if !wanted_milestones.is_empty() {
            match tracker.milestones().await {
                Ok(existing) => {
                    let have: BTreeSet<&str> = existing.iter().map(|m| m.title.as_str()).collect();
                    for m in wanted_milestones.difference(&have) {
                        warn!(milestone = %m, "milestone does not exist; issues using it will fail to create");
                        check.missing_milestones.push(m.to_string());
                    }
                }
                Err(e) => warn!(error = %e, "could not list milestones"),
            }
        }

        let wanted_labels: BTreeSet<&str> = items
            .iter()
            .flat_map(|i| i.labels.iter().map(String::as_str))
            .collect();
        if !wanted_labels.is_empty() {
            match tracker.labels().await {
                Ok(existing) => {
                    let have: BTreeSet<&str> = existing.iter().map(String::as_str).collect();
                    for label in wanted_labels.difference(&have) {
                        check.missing_labels.push(label.to_string());
                        if !self.options.create_missing_labels {
                            warn!(label = %label, "label does not exist");
                            continue;
                        }
                        match tracker.create_label(label).await {
                            Ok(()) => {
                                info!(label = %label, "created missing label");
                                check.created_labels.push(label.to_string());
                            }
                            Err(e) => warn!(label = %label, error = %e, "could not create label"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "could not list labels"),
            }
        }

        check
    }
}
