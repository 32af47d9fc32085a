//! Issue tracker trait

use issuetree_core::Item;
use serde::{Deserialize, Serialize};

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Raw failure from a single tracker call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackerError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("graphql error: {0}")]
    GraphQl(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    /// The call went through but its response was not understood.
    #[error("unparseable response: {0}")]
    Parse(String),
}

impl TrackerError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Worth another attempt: timeouts, transport drops, throttling, 5xx and
    /// GraphQL-level errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::RateLimited | Self::GraphQl(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::AuthFailed(_) | Self::Rejected(_) | Self::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Create request, built from an input item.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

impl From<&Item> for NewIssue {
    fn from(item: &Item) -> Self {
        Self {
            title: item.title.clone(),
            body: item.body.clone().filter(|b| !b.is_empty()),
            milestone: item.milestone.clone(),
            labels: item.labels.clone(),
            assignees: item.assignees.clone(),
        }
    }
}

/// What the tracker hands back for a new issue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub url: String,
    /// Opaque id for relationship calls.
    pub node_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The contract the orchestrator needs from an external tracker.
#[async_trait::async_trait]
pub trait IssueTracker: Send + Sync {
    fn name(&self) -> &str;

    async fn create_issue(&self, issue: &NewIssue) -> TrackerResult<CreatedIssue>;

    /// Attach `child` as a sub-issue of `parent`, both by node id.
    async fn link_sub_issue(&self, parent_node_id: &str, child_node_id: &str) -> TrackerResult<()>;

    async fn milestones(&self) -> TrackerResult<Vec<Milestone>>;

    async fn labels(&self) -> TrackerResult<Vec<String>>;

    async fn create_label(&self, name: &str) -> TrackerResult<()>;
}
