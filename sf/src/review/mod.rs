//! Pull-request quality review
//!
//! A pull request is matched to a backlog task by the id in its title or
//! branch, and the diff is reviewed against that task's acceptance
//! criteria. Webhook signature checks and comment posting live outside
//! this crate.

mod event;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{Story, Task};
use crate::llm::{GenerationError, StructuredCaller, StructuredRequest};
use crate::prompts::{self, PromptLoader};

pub use event::{GitRef, PullRequest, PullRequestEvent, Repository, extract_task_id};

const SYSTEM_PROMPT: &str = "You are a senior engineer doing quality control on pull requests.";

/// Name of the structured-output tool for reviews
pub const SUBMIT_REVIEW: &str = "submit_review";

/// Final verdict on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    ChangesRequested,
}

impl ReviewStatus {
    /// Lenient parse; anything but an approval requests changes
    fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if normalized == "approved" {
            Self::Approved
        } else {
            Self::ChangesRequested
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "Approved"),
            Self::ChangesRequested => write!(f, "Changes Requested"),
        }
    }
}

/// Verdict on one acceptance criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionAnalysis {
    pub criterion: String,
    pub met: bool,
    pub reasoning: String,
}

/// Review of one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub status: ReviewStatus,
    /// 0 to 100
    pub qc_score: f64,
    pub criteria_analysis: Vec<CriterionAnalysis>,
    pub quality_review: String,
    pub security_review: String,
    /// Produced by the fallback path, not by the model
    #[serde(default)]
    pub degraded: bool,
}

impl ReviewReport {
    /// Fallback when the review call fails
    pub fn degraded(reason: &str) -> Self {
        Self {
            status: ReviewStatus::ChangesRequested,
            qc_score: 0.0,
            criteria_analysis: Vec::new(),
            quality_review: format!("Automated analysis failed: {}", reason),
            security_review: "Automated analysis failed.".to_string(),
            degraded: true,
        }
    }

    /// Decode the model's answer leniently
    ///
    /// Accepts the review fields at the top level or under
    /// `detailed_feedback`. An approval with an unmet criterion is
    /// downgraded to ChangesRequested.
    pub fn from_value(value: &Value) -> Self {
        let details = value.get("detailed_feedback").unwrap_or(value);
        let text = |key: &str| {
            details
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("No review provided")
                .to_string()
        };

        let criteria_analysis: Vec<CriterionAnalysis> = details
            .get("criteria_analysis")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let criterion = item.get("criterion")?.as_str()?.trim().to_string();
                        Some(CriterionAnalysis {
                            criterion,
                            met: item.get("met").and_then(Value::as_bool).unwrap_or(false),
                            reasoning: item
                                .get("reasoning")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .trim()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let qc_score = value
            .get("qc_score")
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
            .filter(|s| s.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);

        let mut status = value
            .get("status")
            .and_then(Value::as_str)
            .map(ReviewStatus::parse)
            .unwrap_or(ReviewStatus::ChangesRequested);
        if status == ReviewStatus::Approved && criteria_analysis.iter().any(|c| !c.met) {
            debug!("ReviewReport::from_value: approval with unmet criteria downgraded");
            status = ReviewStatus::ChangesRequested;
        }

        Self {
            status,
            qc_score,
            criteria_analysis,
            quality_review: text("quality_review"),
            security_review: text("security_review"),
            degraded: false,
        }
    }
}

/// JSON schema for a review
pub fn review_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "status": { "type": "string", "enum": ["approved", "changes_requested"] },
            "qc_score": { "type": "number", "minimum": 0, "maximum": 100 },
            "criteria_analysis": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "criterion": { "type": "string" },
                        "met": { "type": "boolean" },
                        "reasoning": { "type": "string" }
                    },
                    "required": ["criterion", "met", "reasoning"]
                }
            },
            "quality_review": { "type": "string" },
            "security_review": { "type": "string" }
        },
        "required": ["status", "qc_score", "criteria_analysis", "quality_review", "security_review"]
    })
}

#[derive(Serialize)]
struct ReviewContext<'a> {
    task_id: &'a str,
    task: String,
    story: Option<String>,
    diff: &'a str,
    schema: String,
}

/// Reviews pull-request diffs against their task
pub struct CodeReviewer {
    caller: StructuredCaller,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl CodeReviewer {
    pub fn new(caller: StructuredCaller, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        debug!(max_tokens, "CodeReviewer::new: called");
        Self {
            caller,
            prompts,
            max_tokens,
        }
    }

    /// Review `diff` against `task`; never fails
    pub async fn review(&self, task: &Task, story: Option<&Story>, diff: &str) -> ReviewReport {
        debug!(task_id = %task.id, diff_len = diff.len(), "CodeReviewer::review: called");
        match self.request(task, story, diff).await {
            Ok(value) => {
                let report = ReviewReport::from_value(&value);
                info!(task_id = %task.id, status = %report.status, qc_score = report.qc_score, "Reviewed submission");
                report
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "review: model call failed, using degraded review");
                ReviewReport::degraded(&e.to_string())
            }
        }
    }

    async fn request(&self, task: &Task, story: Option<&Story>, diff: &str) -> Result<Value, GenerationError> {
        let to_json = |v: Result<String, serde_json::Error>| v.map_err(|e| GenerationError::Prompt(e.to_string()));
        let context = ReviewContext {
            task_id: &task.id,
            task: to_json(serde_json::to_string_pretty(task))?,
            story: story.map(|s| to_json(serde_json::to_string_pretty(s))).transpose()?,
            diff,
            schema: to_json(serde_json::to_string_pretty(&review_schema()))?,
        };

        let user_prompt = self
            .prompts
            .render(prompts::REVIEW_SUBMISSION, &context)
            .map_err(|e| GenerationError::Prompt(e.to_string()))?;

        self.caller
            .generate(StructuredRequest {
                name: SUBMIT_REVIEW.to_string(),
                description: "Submit the pull-request review".to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt,
                schema: review_schema(),
                max_tokens: self.max_tokens,
            })
            .await
    }
}

/// Markdown body for the pull-request comment
pub fn render_comment(report: &ReviewReport, task_id: &str) -> String {
    let mut body = String::new();
    body.push_str("## Automated Quality Review\n\n");
    body.push_str(&format!("**Task:** {}\n", task_id));
    body.push_str(&format!("**Status:** {}\n", report.status));
    body.push_str(&format!("**QC Score:** {:.1}/100\n\n", report.qc_score));

    body.push_str("### Acceptance Criteria\n\n");
    if report.criteria_analysis.is_empty() {
        body.push_str("_No criteria were analysed._\n\n");
    }
    for (i, analysis) in report.criteria_analysis.iter().enumerate() {
        let mark = if analysis.met { "[x]" } else { "[ ]" };
        body.push_str(&format!("{}. {} **{}**\n", i + 1, mark, analysis.criterion));
        if !analysis.reasoning.is_empty() {
            body.push_str(&format!("   {}\n", analysis.reasoning));
        }
        body.push('\n');
    }

    body.push_str("### Code Quality\n\n");
    body.push_str(&report.quality_review);
    body.push_str("\n\n### Security\n\n");
    body.push_str(&report.security_review);
    body.push_str("\n\n---\n*Generated automatically by storyforge*\n");
    body
}
