//! In-process tracker with failure injection.

use crate::provider::{CreatedIssue, IssueTracker, Milestone, NewIssue, TrackerError, TrackerResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    next_number: u64,
    created: Vec<(CreatedIssue, NewIssue)>,
    links: Vec<(String, String)>,
    create_calls: usize,
    link_calls: usize,
    /// Remaining injected failures per title.
    create_failures: HashMap<String, (usize, TrackerError)>,
    /// Remaining injected failures per child node id.
    link_failures: HashMap<String, (usize, TrackerError)>,
    milestones: Vec<Milestone>,
    labels: BTreeSet<String>,
}

/// Tracker that keeps everything in memory. Numbers start at 1.
pub struct InMemoryTracker {
    repository: String,
    state: Mutex<State>,
    delay: Option<Duration>,
}

impl InMemoryTracker {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            state: Mutex::new(State {
                next_number: 1,
                ..Default::default()
            }),
            delay: None,
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_milestone(self, title: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            let number = state.milestones.len() as u64 + 1;
            state.milestones.push(Milestone {
                number,
                title: title.into(),
                description: None,
            });
        }
        self
    }

    pub fn with_label(self, name: impl Into<String>) -> Self {
        self.lock().labels.insert(name.into());
        self
    }

    /// Fail the next `times` create calls for `title` with `error`.
    pub fn fail_create(&self, title: impl Into<String>, times: usize, error: TrackerError) {
        self.lock().create_failures.insert(title.into(), (times, error));
    }

    /// Fail the next `times` link calls whose child is `child_node_id`.
    pub fn fail_link(&self, child_node_id: impl Into<String>, times: usize, error: TrackerError) {
        self.lock()
            .link_failures
            .insert(child_node_id.into(), (times, error));
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn link_calls(&self) -> usize {
        self.lock().link_calls
    }

    /// Issues that were actually created, in creation order.
    pub fn created(&self) -> Vec<CreatedIssue> {
        self.lock().created.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.lock()
            .created
            .iter()
            .map(|(_, req)| req.title.clone())
            .collect()
    }

    /// Established `(parent, child)` node id pairs.
    pub fn links(&self) -> Vec<(String, String)> {
        self.lock().links.clone()
    }

    /// Node id for issue `number`, matching what `create_issue` hands out.
    pub fn node_id(number: u64) -> String {
        format!("I_mem{}", number)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn take_failure(
    failures: &mut HashMap<String, (usize, TrackerError)>,
    key: &str,
) -> Option<TrackerError> {
    let (remaining, error) = failures.get_mut(key)?;
    if *remaining == 0 {
        return None;
    }
    *remaining -= 1;
    Some(error.clone())
}

#[async_trait::async_trait]
impl IssueTracker for InMemoryTracker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_issue(&self, issue: &NewIssue) -> TrackerResult<CreatedIssue> {
        self.pause().await;
        let mut state = self.lock();
        state.create_calls += 1;
        if let Some(err) = take_failure(&mut state.create_failures, &issue.title) {
            return Err(err);
        }
        let number = state.next_number;
        state.next_number += 1;
        let created = CreatedIssue {
            number,
            url: format!("https://github.com/{}/issues/{}", self.repository, number),
            node_id: Self::node_id(number),
        };
        state.created.push((created.clone(), issue.clone()));
        Ok(created)
    }

    async fn link_sub_issue(&self, parent_node_id: &str, child_node_id: &str) -> TrackerResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.link_calls += 1;
        if let Some(err) = take_failure(&mut state.link_failures, child_node_id) {
            return Err(err);
        }
        let known = |id: &str| state.created.iter().any(|(c, _)| c.node_id == id);
        if !known(parent_node_id) || !known(child_node_id) {
            return Err(TrackerError::Rejected(format!(
                "unknown node id in link {} -> {}",
                parent_node_id, child_node_id
            )));
        }
        state
            .links
            .push((parent_node_id.to_string(), child_node_id.to_string()));
        Ok(())
    }

    async fn milestones(&self) -> TrackerResult<Vec<Milestone>> {
        Ok(self.lock().milestones.clone())
    }

    async fn labels(&self) -> TrackerResult<Vec<String>> {
        Ok(self.lock().labels.iter().cloned().collect())
    }

    async fn create_label(&self, name: &str) -> TrackerResult<()> {
        self.lock().labels.insert(name.to_string());
        Ok(())
    }
}
