//! GitHub adapter: REST for issues, labels and milestones; GraphQL for sub-issue links.

use crate::provider::{CreatedIssue, IssueTracker, Milestone, NewIssue, TrackerError, TrackerResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("issuetree/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;
const NEW_LABEL_COLOR: &str = "cccccc";

const ADD_SUB_ISSUE: &str = "mutation($parentId: ID!, $childId: ID!) {
  addSubIssue(input: {issueId: $parentId, subIssueId: $childId}) {
    issue { id }
  }
}";

pub struct GitHubTracker {
    client: Client,
    token: String,
    base_url: String,
    repository: String,
    /// Milestone title to number, filled on first use.
    milestone_numbers: Mutex<Option<HashMap<String, u64>>>,
}

impl GitHubTracker {
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> TrackerResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            token: token.into(),
            base_url: GITHUB_API_URL.to_string(),
            repository: repository.into(),
            milestone_numbers: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, self.repository, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", GITHUB_API_VERSION)
    }

    async fn milestone_number(&self, title: &str) -> TrackerResult<u64> {
        let mut cache = self.milestone_numbers.lock().await;
        if cache.is_none() {
            let all = self.milestones().await?;
            *cache = Some(all.into_iter().map(|m| (m.title, m.number)).collect());
        }
        cache
            .as_ref()
            .and_then(|map| map.get(title).copied())
            .ok_or_else(|| TrackerError::Rejected(format!("milestone not found: {}", title)))
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> TrackerResult<Vec<T>> {
        let mut out = Vec::new();
        let per_page = PAGE_SIZE.to_string();
        for page in 1.. {
            let page_str = page.to_string();
            let req = self
                .authed(self.client.get(self.repo_url(path)))
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let batch: Vec<T> = decode(check(req.send().await?).await?).await?;
            let done = batch.len() < PAGE_SIZE;
            out.extend(batch);
            if done {
                break;
            }
        }
        Ok(out)
    }
}

/// Map a non-success response onto the error taxonomy.
async fn check(response: Response) -> TrackerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let rate_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let error_text = response.text().await.unwrap_or_default();
    error!("GitHub error {}: {}", status, error_text);

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => TrackerError::RateLimited,
        StatusCode::FORBIDDEN if rate_exhausted => TrackerError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TrackerError::AuthFailed(error_text),
        _ => TrackerError::api(status.as_u16(), error_text),
    })
}

/// The request went through; a body we cannot read is a parse failure.
/// That includes a body cut off after a 2xx: the issue may already exist.
async fn decode<T: DeserializeOwned>(response: Response) -> TrackerResult<T> {
    let text = response
        .text()
        .await
        .map_err(|e| TrackerError::Parse(format!("reading response body: {}", e)))?;
    serde_json::from_str(&text).map_err(|e| TrackerError::Parse(e.to_string()))
}

#[derive(Serialize)]
struct CreateIssueBody<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milestone: Option<u64>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    labels: &'a [String],
    #[serde(skip_serializing_if = "is_empty_slice")]
    assignees: &'a [String],
}

fn is_empty_slice(s: &&[String]) -> bool {
    s.is_empty()
}

#[derive(Deserialize)]
struct IssueResponse {
    number: u64,
    html_url: String,
    node_id: String,
}

#[derive(Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[async_trait::async_trait]
impl IssueTracker for GitHubTracker {
    fn name(&self) -> &str {
        "github"
    }

    async fn create_issue(&self, issue: &NewIssue) -> TrackerResult<CreatedIssue> {
        let milestone = match issue.milestone.as_deref() {
            Some(title) => Some(self.milestone_number(title).await?),
            None => None,
        };
        let body = CreateIssueBody {
            title: &issue.title,
            body: issue.body.as_deref(),
            milestone,
            labels: &issue.labels,
            assignees: &issue.assignees,
        };
        debug!(repository = %self.repository, title = %issue.title, "creating issue");

        let response = self
            .authed(self.client.post(self.repo_url("issues")))
            .json(&body)
            .send()
            .await?;
        let created: IssueResponse = decode(check(response).await?).await?;
        Ok(CreatedIssue {
            number: created.number,
            url: created.html_url,
            node_id: created.node_id,
        })
    }

    async fn link_sub_issue(&self, parent_node_id: &str, child_node_id: &str) -> TrackerResult<()> {
        let payload = serde_json::json!({
            "query": ADD_SUB_ISSUE,
            "variables": { "parentId": parent_node_id, "childId": child_node_id },
        });
        let response = self
            .authed(self.client.post(format!("{}/graphql", self.base_url)))
            .json(&payload)
            .send()
            .await?;
        let result: GraphQlResponse = decode(check(response).await?).await?;

        if !result.errors.is_empty() {
            let messages: Vec<String> = result.errors.into_iter().map(|e| e.message).collect();
            warn!(parent = parent_node_id, child = child_node_id, "addSubIssue returned errors");
            return Err(TrackerError::GraphQl(messages.join("; ")));
        }
        let linked = result
            .data
            .as_ref()
            .and_then(|d| d.pointer("/addSubIssue/issue/id"))
            .is_some();
        if !linked {
            return Err(TrackerError::Parse("addSubIssue response has no issue id".into()));
        }
        Ok(())
    }

    async fn milestones(&self) -> TrackerResult<Vec<Milestone>> {
        self.get_all("milestones", &[("state", "all")]).await
    }

    async fn labels(&self) -> TrackerResult<Vec<String>> {
        let labels: Vec<LabelResponse> = self.get_all("labels", &[]).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn create_label(&self, name: &str) -> TrackerResult<()> {
        let response = self
            .authed(self.client.post(self.repo_url("labels")))
            .json(&serde_json::json!({ "name": name, "color": NEW_LABEL_COLOR }))
            .send()
            .await?;
        check(response).await?;
        debug!(label = name, "label created");
        Ok(())
    }
}

/// Token from `GITHUB_TOKEN`, then `GH_TOKEN`, then `gh auth token`.
pub async fn resolve_token() -> TrackerResult<String> {
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
    }

    let output = tokio::process::Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
        .map_err(|e| TrackerError::AuthFailed(format!("no token in environment and gh unavailable: {}", e)))?;
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || token.is_empty() {
        return Err(TrackerError::AuthFailed(
            "no token in GITHUB_TOKEN or GH_TOKEN and `gh auth token` returned nothing".into(),
        ));
    }
    Ok(token)
}
