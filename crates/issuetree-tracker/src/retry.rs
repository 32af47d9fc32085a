//! Retry-with-backoff around the two side-effecting tracker calls.
//!
//! The wrapper only reports; deciding whether an item or a run has failed is
//! left to the caller.

use crate::provider::{CreatedIssue, IssueTracker, NewIssue, TrackerError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Link,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Link => write!(f, "link"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Failed {
        operation: Operation,
        attempts: u32,
        #[source]
        source: TrackerError,
    },

    /// Never retried: the side effect may already have happened.
    #[error("{operation} response could not be parsed: {message}")]
    Parse { operation: Operation, message: String },
}

impl OperationError {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Failed { operation, .. } | Self::Parse { operation, .. } => *operation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt budget for issue creation.
    pub create_attempts: u32,
    /// Larger budget for linking, which depends on both issues being visible.
    pub link_attempts: u32,
    /// Wait after the first failure; doubles after each further failure.
    pub base_delay: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            create_attempts: 3,
            link_attempts: 5,
            base_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base × 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// A tracker whose create and link calls are retried and time-bounded.
#[derive(Clone)]
pub struct ResilientTracker {
    inner: Arc<dyn IssueTracker>,
    policy: RetryPolicy,
}

impl ResilientTracker {
    pub fn new(inner: Arc<dyn IssueTracker>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Arc<dyn IssueTracker> {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn create(&self, issue: &NewIssue) -> Result<CreatedIssue, OperationError> {
        let created = self
            .with_retry(Operation::Create, self.policy.create_attempts, || {
                self.inner.create_issue(issue)
            })
            .await?;
        debug!(number = created.number, title = %issue.title, "issue created");
        Ok(created)
    }

    pub async fn link(&self, parent_node_id: &str, child_node_id: &str) -> Result<(), OperationError> {
        self.with_retry(Operation::Link, self.policy.link_attempts, || {
            self.inner.link_sub_issue(parent_node_id, child_node_id)
        })
        .await?;
        debug!(parent = parent_node_id, child = child_node_id, "sub-issue linked");
        Ok(())
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: Operation,
        attempts: u32,
        mut call: F,
    ) -> Result<T, OperationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TrackerError>>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.policy.attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(TrackerError::Timeout),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(TrackerError::Parse(message)) => {
                    return Err(OperationError::Parse { operation, message });
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        %operation,
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "tracker call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(OperationError::Failed {
                        operation,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}
