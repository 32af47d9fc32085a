//! Core types for issuetree

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One issue to create, as declared in the input document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Local id, unique within the batch. Only used to wire parents.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: None,
            parent_id: None,
            labels: Vec::new(),
            milestone: None,
            assignees: Vec::new(),
            due_date: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Batch-wide defaults. Labels merge with item labels; everything else only
/// fills in when the item leaves the field out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// The whole input document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchInput {
    /// Target repository in `owner/repo` form.
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,
    pub issues: Vec<Item>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// One execution attempt of a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub input_file: String,
    pub input_file_hash: String,
    pub repository: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

/// Ledger row for an issue that exists in the tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedItemRecord {
    pub run_id: String,
    pub local_id: String,
    pub external_number: u64,
    pub external_url: String,
    /// Opaque id used only for relationship calls; not the issue number.
    pub external_node_id: String,
    pub title: String,
    pub fingerprint: String,
    pub parent_id: Option<String>,
    pub parent_external_number: Option<u64>,
    pub linked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CreatedItemRecord {
    pub fn is_linked(&self) -> bool {
        self.linked_at.is_some()
    }
}

/// Fields the caller supplies when recording a freshly created issue.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCreatedItem {
    pub run_id: String,
    pub local_id: String,
    pub external_number: u64,
    pub external_url: String,
    pub external_node_id: String,
    pub title: String,
    pub fingerprint: String,
    pub parent_id: Option<String>,
}

/// Derived per-run link statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: u64,
    pub linked: u64,
    pub unlinked: u64,
}

/// Per-execution outcome counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub linked: usize,
}

impl RunCounters {
    pub fn processed(&self) -> usize {
        self.created + self.skipped + self.failed
    }
}
