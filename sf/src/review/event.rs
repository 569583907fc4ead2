//! Pull-request webhook payloads and task-id extraction

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The parts of a GitHub `pull_request` webhook the review needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub html_url: String,
    pub head: GitRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

impl PullRequestEvent {
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Only newly opened or updated pull requests are reviewed
    pub fn wants_review(&self) -> bool {
        matches!(self.action.as_str(), "opened" | "synchronize" | "reopened")
    }

    pub fn branch(&self) -> &str {
        &self.pull_request.head.name
    }

    /// Task id referenced by the title or, failing that, the branch
    pub fn task_id(&self) -> Option<String> {
        extract_task_id(&self.pull_request.title, self.branch())
    }
}

/// Patterns tried in order against each source
const TASK_ID_PATTERNS: [&str; 3] = [r"(?i)\bT(\d{3})\b", r"(?i)\bTASK-(\d{3})\b", r"\b(\d{3})\b"];

/// Find a `T###` task reference in a PR title, then in its branch name
///
/// Accepts `T001`, `TASK-001` (any case) and a bare `001`, all normalised
/// to `T001`.
pub fn extract_task_id(title: &str, branch: &str) -> Option<String> {
    debug!(%title, %branch, "extract_task_id: called");
    [title, branch].iter().find_map(|source| {
        TASK_ID_PATTERNS.iter().find_map(|pattern| {
            let re = Regex::new(pattern).ok()?;
            let digits = re.captures(source)?.get(1)?.as_str();
            Some(format!("T{}", digits))
        })
    })
}
