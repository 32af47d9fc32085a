//! issuetree tracker - external issue tracker contract, retry wrapper, adapters

pub mod github;
pub mod memory;
pub mod provider;
pub mod retry;

pub use github::GitHubTracker;
pub use memory::InMemoryTracker;
pub use provider::{CreatedIssue, IssueTracker, Milestone, NewIssue, TrackerError, TrackerResult};
pub use retry::{Operation, OperationError, ResilientTracker, RetryPolicy};
