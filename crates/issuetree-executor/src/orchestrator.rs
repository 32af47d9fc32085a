//! Per-item create-and-link loop.
//!
//! Items are processed strictly one at a time in graph order. For each id:
//!
//! 1. resume probe: already recorded for this run → skipped
//! 2. fingerprint probe across runs (unless forced): hit → skipped
//! 3. create through the retrying tracker: failure → failed, move on
//! 4. record the new issue in the ledger
//! 5. link to the parent's record in this run, if there is one
//!
//! Tracker failures stay scoped to their item. Ledger errors end the run.

use issuetree_core::{fingerprint, IssueGraph, Item, NewCreatedItem, RunCounters};
use issuetree_ledger::{Ledger, LedgerResult};
use issuetree_tracker::{NewIssue, ResilientTracker};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Skip the cross-run duplicate probe.
    pub force: bool,
    /// Log what would happen; touch neither ledger nor tracker.
    pub dry_run: bool,
    /// Consult existing records for this run id.
    pub resuming: bool,
}

/// Result of one pass over the order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Orchestration {
    pub counters: RunCounters,
    /// Local ids whose create call failed.
    pub failed_ids: Vec<String>,
}

pub struct Orchestrator<'a> {
    ledger: &'a Ledger,
    tracker: &'a ResilientTracker,
    repository: &'a str,
    options: OrchestratorOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ledger: &'a Ledger,
        tracker: &'a ResilientTracker,
        repository: &'a str,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            ledger,
            tracker,
            repository,
            options,
        }
    }

    pub async fn execute(
        &self,
        run_id: &str,
        graph: &IssueGraph,
        order: &[String],
    ) -> LedgerResult<Orchestration> {
        let mut result = Orchestration::default();
        let total = order.len();

        for (index, id) in order.iter().enumerate() {
            let Some(item) = graph.get(id) else {
                warn!(run_id, id = %id, "id in order but not in graph, skipping");
                continue;
            };
            debug!(run_id, id = %id, position = index + 1, total, "processing");

            if self.options.dry_run {
                info!(
                    id = %id,
                    title = %item.title,
                    parent = item.parent_id.as_deref().unwrap_or("-"),
                    "would create"
                );
                result.counters.created += 1;
                continue;
            }

            self.process(run_id, item, &mut result).await?;
        }

        info!(
            run_id,
            created = result.counters.created,
            skipped = result.counters.skipped,
            failed = result.counters.failed,
            linked = result.counters.linked,
            "batch processed"
        );
        Ok(result)
    }

    async fn process(&self, run_id: &str, item: &Item, result: &mut Orchestration) -> LedgerResult<()> {
        if self.options.resuming {
            if let Some(existing) = self.ledger.get_created_item(run_id, &item.id)? {
                debug!(run_id, id = %item.id, number = existing.external_number, "already created in this run");
                result.counters.skipped += 1;
                return Ok(());
            }
        }

        let fp = fingerprint(self.repository, &item.title, item.body.as_deref());
        if !self.options.force {
            if let Some(existing) = self.ledger.find_by_fingerprint(&fp)? {
                info!(
                    run_id,
                    id = %item.id,
                    number = existing.external_number,
                    previous_run = %existing.run_id,
                    "duplicate content, skipping"
                );
                result.counters.skipped += 1;
                return Ok(());
            }
        }

        let created = match self.tracker.create(&NewIssue::from(item)).await {
            Ok(created) => created,
            Err(e) => {
                warn!(run_id, id = %item.id, title = %item.title, error = %e, "create failed");
                result.counters.failed += 1;
                result.failed_ids.push(item.id.clone());
                return Ok(());
            }
        };

        self.ledger.record_created_item(&NewCreatedItem {
            run_id: run_id.to_string(),
            local_id: item.id.clone(),
            external_number: created.number,
            external_url: created.url.clone(),
            external_node_id: created.node_id.clone(),
            title: item.title.clone(),
            fingerprint: fp,
            parent_id: item.parent_id.clone(),
        })?;
        result.counters.created += 1;
        info!(run_id, id = %item.id, number = created.number, url = %created.url, "created");

        let Some(parent_id) = item.parent_id.as_deref() else {
            return Ok(());
        };
        let Some(parent) = self.ledger.get_created_item(run_id, parent_id)? else {
            warn!(run_id, id = %item.id, parent = parent_id, "parent not recorded in this run, not linking");
            return Ok(());
        };

        match self.tracker.link(&parent.external_node_id, &created.node_id).await {
            Ok(()) => {
                self.ledger.record_link(run_id, &item.id, parent.external_number)?;
                result.counters.linked += 1;
                info!(run_id, id = %item.id, parent = parent.external_number, "linked");
            }
            Err(e) => {
                warn!(
                    run_id,
                    id = %item.id,
                    number = created.number,
                    parent = parent.external_number,
                    error = %e,
                    "link failed"
                );
            }
        }
        Ok(())
    }
}
