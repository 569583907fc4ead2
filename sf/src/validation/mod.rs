//! Story validation
//!
//! Combines deterministic structural checks with a model-judged semantic
//! score. A failed scoring call never stops the workflow: it degrades to a
//! fixed moderate score and the loop continues.

pub mod score;
pub mod structural;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ValidationConfig;
use crate::domain::{RequirementsBundle, Story, ValidationFeedback, ValidationRecord};
use crate::llm::{GenerationError, StructuredCaller, StructuredRequest};
use crate::prompts::{self, PromptLoader};

pub use score::{SemanticAssessment, combine_score, derive_status};
pub use structural::{StructuralReport, check_stories};

const SYSTEM_PROMPT: &str = "You are a meticulous agile coach who reviews user story backlogs against their requirements.";

/// Name of the structured-output tool for validation
pub const SUBMIT_VALIDATION: &str = "submit_validation";

/// Score below which the next attempt is told to raise overall quality
const QUALITY_INSTRUCTION_SCORE: f64 = 70.0;

/// JSON schema for the semantic assessment
pub fn validation_schema() -> serde_json::Value {
    let string_list = serde_json::json!({ "type": "array", "items": { "type": "string" } });
    serde_json::json!({
        "type": "object",
        "properties": {
            "validation_score": { "type": "number", "minimum": 0, "maximum": 100 },
            "critical_issues": string_list,
            "missing_requirements": string_list,
            "recommendations": string_list,
            "warnings": string_list,
            "story_issues": {
                "type": "object",
                "additionalProperties": string_list
            },
            "source_analysis": {
                "type": "object",
                "properties": {
                    "source_coverage_score": { "type": "number" },
                    "integration_quality": { "type": "number" },
                    "conflict_resolution_score": { "type": "number" }
                }
            }
        },
        "required": ["validation_score", "critical_issues", "missing_requirements", "recommendations"]
    })
}

#[derive(Serialize)]
struct ValidationContext {
    requirements: String,
    stories: String,
    story_count: usize,
    has_documents: bool,
    schema: String,
}

/// Scores candidate backlogs
pub struct StoryValidator {
    caller: StructuredCaller,
    prompts: Arc<PromptLoader>,
    config: ValidationConfig,
    max_tokens: u32,
}

impl StoryValidator {
    pub fn new(caller: StructuredCaller, prompts: Arc<PromptLoader>, config: ValidationConfig, max_tokens: u32) -> Self {
        debug!(?config, "StoryValidator::new: called");
        Self {
            caller,
            prompts,
            config,
            max_tokens,
        }
    }

    /// Produce the validation record for a backlog; never fails
    pub async fn validate(&self, requirements: &RequirementsBundle, stories: &[Story]) -> ValidationRecord {
        debug!(count = stories.len(), "StoryValidator::validate: called");
        if stories.is_empty() {
            warn!("validate: no stories to validate");
            return ValidationRecord::empty_backlog();
        }

        let requirements_text = requirements.combined_text();
        let structural = check_stories(&requirements_text, stories);

        let semantic = match self.assess(requirements, &requirements_text, stories).await {
            Ok(value) => SemanticAssessment::from_value(&value),
            Err(e) => {
                warn!(error = %e, "validate: semantic scoring failed, using degraded assessment");
                SemanticAssessment::degraded(&e.to_string(), self.config.degraded_score)
            }
        };

        let record = self.build_record(&structural, semantic);
        info!(
            score = record.score,
            status = %record.status,
            structural_issues = record.structural_issue_count,
            degraded = record.degraded,
            "Validated user stories"
        );
        record
    }

    async fn assess(
        &self,
        requirements: &RequirementsBundle,
        requirements_text: &str,
        stories: &[Story],
    ) -> Result<serde_json::Value, GenerationError> {
        let context = ValidationContext {
            requirements: requirements_text.to_string(),
            stories: to_pretty_json(&stories)?,
            story_count: stories.len(),
            has_documents: !requirements.documents.is_empty(),
            schema: to_pretty_json(&validation_schema())?,
        };

        let user_prompt = self
            .prompts
            .render(prompts::VALIDATE_STORIES, &context)
            .map_err(|e| GenerationError::Prompt(e.to_string()))?;

        self.caller
            .generate(StructuredRequest {
                name: SUBMIT_VALIDATION.to_string(),
                description: "Submit the backlog assessment".to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt,
                schema: validation_schema(),
                max_tokens: self.max_tokens,
            })
            .await
    }

    /// Combine structural findings with the semantic assessment
    pub fn build_record(&self, structural: &StructuralReport, semantic: SemanticAssessment) -> ValidationRecord {
        let issue_count = structural.issue_count();
        let semantic_score = semantic.adjusted_score(&self.config);
        let score = combine_score(semantic_score, issue_count, &self.config);
        let status = derive_status(score, issue_count, &self.config);

        let mut issues = structural.story_issues.clone();
        for (id, story_issues) in semantic.story_issues {
            issues.entry(id).or_default().extend(story_issues);
        }

        let mut missing_requirements = semantic.missing_requirements;
        for term in &structural.uncovered_terms {
            let entry = format!("Coverage for '{}' mentioned in requirements", term);
            if !missing_requirements.contains(&entry) {
                missing_requirements.push(entry);
            }
        }

        let mut improvement_instructions = Vec::new();
        if !semantic.critical_issues.is_empty() {
            improvement_instructions.push("Fix all critical issues identified in the validation".to_string());
        }
        if !missing_requirements.is_empty() {
            improvement_instructions.push("Add user stories to cover missing requirements".to_string());
        }
        if !issues.is_empty() {
            improvement_instructions.push("Address story-specific formatting and content issues".to_string());
        }
        if score < QUALITY_INSTRUCTION_SCORE {
            improvement_instructions
                .push("Improve overall story quality to achieve higher validation score".to_string());
        }

        ValidationRecord {
            status,
            score,
            issues,
            feedback: ValidationFeedback {
                critical_issues: semantic.critical_issues,
                missing_requirements,
                recommendations: semantic.recommendations,
                warnings: semantic.warnings,
                structural_issues: structural.all_issues(),
                improvement_instructions,
            },
            semantic_score,
            structural_issue_count: issue_count,
            source_analysis: semantic.source_analysis,
            degraded: semantic.degraded,
        }
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, GenerationError> {
    serde_json::to_string_pretty(value).map_err(|e| GenerationError::Prompt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationStatus;
    use crate::domain::story::fixtures::story;
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use crate::llm::{CompletionResponse, LlmClient, LlmError};
    use serde_json::json;
    use std::time::Duration;

    fn validator(client: Arc<dyn LlmClient>) -> StoryValidator {
        StoryValidator::new(
            StructuredCaller::new(client, Duration::from_secs(5)),
            Arc::new(PromptLoader::embedded_only()),
            ValidationConfig::default(),
            4096,
        )
    }

    fn assessment(score: f64) -> CompletionResponse {
        CompletionResponse::tool(
            SUBMIT_VALIDATION,
            json!({
                "validation_score": score,
                "critical_issues": [],
                "missing_requirements": [],
                "recommendations": ["Split large stories"],
                "story_issues": {"US002": ["Acceptance criteria are vague"]}
            }),
        )
    }

    #[tokio::test]
    async fn test_empty_backlog_skips_model() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let record = validator(client.clone())
            .validate(&RequirementsBundle::new("anything"), &[])
            .await;

        assert_eq!(record.score, 0.0);
        assert_eq!(record.feedback.critical_issues, vec!["No user stories generated"]);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_clean_backlog_approved() {
        let client = Arc::new(MockLlmClient::new(vec![assessment(88.0)]));
        let stories = vec![story("US001", &[]), story("US002", &["US001"])];
        let record = validator(client).validate(&RequirementsBundle::new("A notes app"), &stories).await;

        assert_eq!(record.score, 88.0);
        assert_eq!(record.status, ValidationStatus::Approved);
        assert_eq!(record.issues["US002"], vec!["Acceptance criteria are vague"]);
        assert_eq!(record.feedback.recommendations, vec!["Split large stories"]);
        assert!(!record.degraded);
    }

    #[tokio::test]
    async fn test_structural_penalty_applied() {
        let client = Arc::new(MockLlmClient::new(vec![assessment(85.0)]));
        let mut bad = story("US002", &["US009"]);
        bad.estimated_points = 4;
        let stories = vec![story("US001", &[]), bad];
        let record = validator(client).validate(&RequirementsBundle::new("A notes app"), &stories).await;

        assert_eq!(record.structural_issue_count, 2);
        assert_eq!(record.score, 81.0);
        assert_eq!(record.status, ValidationStatus::Approved);
        assert_eq!(record.feedback.structural_issues.len(), 2);
        assert_eq!(record.issues["US002"].len(), 3);
    }

    #[tokio::test]
    async fn test_model_failure_degrades() {
        let client = Arc::new(MockLlmClient::scripted(vec![MockReply::Fail(LlmError::Timeout(
            Duration::from_secs(30),
        ))]));
        let stories = vec![story("US001", &[])];
        let record = validator(client).validate(&RequirementsBundle::new("A notes app"), &stories).await;

        assert!(record.degraded);
        assert_eq!(record.score, 60.0);
        assert_eq!(record.status, ValidationStatus::NeedsRevision);
        assert!(record.feedback.critical_issues[0].contains("Timeout"));
        assert!(record.feedback.recommendations[0].contains("Manual review"));
    }

    #[tokio::test]
    async fn test_unparseable_answer_degrades() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse::text("Looks fine to me!")]));
        let stories = vec![story("US001", &[])];
        let record = validator(client).validate(&RequirementsBundle::new("A notes app"), &stories).await;
        assert!(record.degraded);
        assert_eq!(record.score, 60.0);
    }

    #[tokio::test]
    async fn test_coverage_gap_reported_as_missing_requirement() {
        let client = Arc::new(MockLlmClient::new(vec![assessment(78.0)]));
        let mut login = story("US001", &[]);
        login.title = "As a user, I want a login form so that I can reach my account".to_string();
        let record = validator(client.clone())
            .validate(&RequirementsBundle::new("Users need a secure login"), &[login])
            .await;

        assert_eq!(record.structural_issue_count, 1);
        assert_eq!(record.score, 76.0);
        assert_eq!(record.status, ValidationStatus::NeedsRevision);
        assert!(
            record
                .feedback
                .missing_requirements
                .contains(&"Coverage for 'security' mentioned in requirements".to_string())
        );
        assert!(
            record
                .feedback
                .improvement_instructions
                .contains(&"Add user stories to cover missing requirements".to_string())
        );

        let prompt = &client.requests()[0].messages[0].content;
        assert!(prompt.contains("Users need a secure login"));
        assert!(prompt.contains("1 user stories"));
    }
}
