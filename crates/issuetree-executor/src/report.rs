//! Caller-facing summary of one invocation.

use chrono::{DateTime, Utc};
use issuetree_core::RunCounters;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every item created, skipped or linked as planned.
    Success,
    /// The run finished but some items could not be created.
    Partial,
    DryRun,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub repository: String,
    /// No item failed.
    pub success: bool,
    pub counters: RunCounters,
    pub failed_ids: Vec<String>,
    pub outcome: Outcome,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
}

impl RunReport {
    pub fn new(
        run_id: &str,
        repository: &str,
        counters: RunCounters,
        failed_ids: Vec<String>,
        dry_run: bool,
        started: DateTime<Utc>,
    ) -> Self {
        let success = counters.failed == 0;
        let outcome = if dry_run {
            Outcome::DryRun
        } else if success {
            Outcome::Success
        } else {
            Outcome::Partial
        };
        Self {
            run_id: run_id.into(),
            repository: repository.into(),
            success,
            counters,
            failed_ids,
            outcome,
            started,
            ended: Utc::now(),
        }
    }

    pub fn wall_ms(&self) -> u64 {
        (self.ended - self.started).num_milliseconds().max(0) as u64
    }

    pub fn summary_line(&self) -> String {
        format!(
            "run {} [{}]: {} created, {} skipped, {} failed, {} linked in {}",
            self.run_id,
            self.outcome,
            self.counters.created,
            self.counters.skipped,
            self.counters.failed,
            self.counters.linked,
            format_duration(self.wall_ms()),
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
