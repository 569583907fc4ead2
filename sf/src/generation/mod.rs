//! Story generation
//!
//! Renders the generation prompt (with retry feedback when present), calls
//! the model for structured output, and normalizes the answer into a
//! contiguous, repaired backlog.

pub mod normalize;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{Story, WorkflowState};
use crate::llm::structured::take_array;
use crate::llm::{GenerationError, StructuredCaller, StructuredRequest};
use crate::prompts::{self, PromptLoader};
use crate::workflow::FeedbackPayload;

pub use normalize::{RawStory, fill_coverage_gaps, normalize_stories};

const SYSTEM_PROMPT: &str = "You are a senior product manager who writes precise, testable agile user stories.";

/// Name of the structured-output tool for story generation
pub const SUBMIT_STORIES: &str = "submit_stories";

/// JSON schema for a generated backlog
pub fn stories_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "stories": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "US001, US002, ..." },
                        "title": { "type": "string", "description": "As a <persona>, I want <capability> so that <benefit>" },
                        "description": { "type": "string" },
                        "acceptance_criteria": { "type": "array", "items": { "type": "string" }, "minItems": 3, "maxItems": 7 },
                        "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                        "estimated_points": { "type": "integer", "enum": [1, 2, 3, 5, 8, 13] },
                        "dependencies": { "type": "array", "items": { "type": "string" } },
                        "technical_notes": { "type": "string" }
                    },
                    "required": ["id", "title", "description", "acceptance_criteria", "priority", "estimated_points"]
                }
            }
        },
        "required": ["stories"]
    })
}

#[derive(Serialize)]
struct DocumentContext<'a> {
    filename: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationContext<'a> {
    requirements: &'a str,
    documents: Vec<DocumentContext<'a>>,
    project_context: String,
    schema: String,
    iteration: u32,
    feedback: Option<FeedbackPayload>,
    previous_stories: String,
}

/// Produces candidate backlogs from requirements
pub struct StoryGenerator {
    caller: StructuredCaller,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
    fill_coverage_gaps: bool,
}

impl StoryGenerator {
    pub fn new(caller: StructuredCaller, prompts: Arc<PromptLoader>, max_tokens: u32, fill_coverage_gaps: bool) -> Self {
        debug!(max_tokens, fill_coverage_gaps, "StoryGenerator::new: called");
        Self {
            caller,
            prompts,
            max_tokens,
            fill_coverage_gaps,
        }
    }

    /// Render the generation prompt for the current attempt
    pub fn render_prompt(&self, state: &WorkflowState) -> Result<String, GenerationError> {
        let feedback = FeedbackPayload::for_retry(state);
        debug!(iteration = state.iteration_count, has_feedback = feedback.is_some(), "render_prompt: called");

        let previous_stories = if feedback.is_some() {
            to_pretty_json(&state.previous_stories)?
        } else {
            String::new()
        };

        let context = GenerationContext {
            requirements: state.requirements.primary_text.trim(),
            documents: state
                .requirements
                .documents
                .iter()
                .map(|d| DocumentContext {
                    filename: &d.filename,
                    text: d.extracted_text.trim(),
                })
                .collect(),
            project_context: to_pretty_json(&state.project_context)?,
            schema: to_pretty_json(&stories_schema())?,
            iteration: state.iteration_count,
            feedback,
            previous_stories,
        };

        self.prompts
            .render(prompts::GENERATE_STORIES, &context)
            .map_err(|e| GenerationError::Prompt(e.to_string()))
    }

    /// Generate one candidate backlog
    pub async fn generate(&self, state: &WorkflowState) -> Result<Vec<Story>, GenerationError> {
        debug!(iteration = state.iteration_count, "StoryGenerator::generate: called");
        let user_prompt = self.render_prompt(state)?;

        let value = self
            .caller
            .generate(StructuredRequest {
                name: SUBMIT_STORIES.to_string(),
                description: "Submit the complete backlog of user stories".to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt,
                schema: stories_schema(),
                max_tokens: self.max_tokens,
            })
            .await?;

        let mut stories = normalize_stories(take_array(value, "stories")?);
        if self.fill_coverage_gaps {
            let added = fill_coverage_gaps(&state.requirements.combined_text(), &mut stories);
            if added > 0 {
                info!(added, "Appended non-functional stories for uncovered areas");
            }
        }

        info!(
            iteration = state.iteration_count,
            count = stories.len(),
            "Generated user stories"
        );
        Ok(stories)
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, GenerationError> {
    serde_json::to_string_pretty(value).map_err(|e| GenerationError::Prompt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::story::fixtures::story;
    use crate::domain::{ProjectContext, RequirementsBundle, ValidationRecord};
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, LlmClient};
    use serde_json::json;
    use std::time::Duration;

    fn generator(client: Arc<dyn LlmClient>, fill: bool) -> StoryGenerator {
        StoryGenerator::new(
            StructuredCaller::new(client, Duration::from_secs(5)),
            Arc::new(PromptLoader::embedded_only()),
            4096,
            fill,
        )
    }

    fn state() -> WorkflowState {
        let mut context = ProjectContext::new();
        context.insert("tech_stack".to_string(), json!("rust"));
        let mut state = WorkflowState::new(
            RequirementsBundle::new("Users need secure login").with_document("brief.txt", "Mobile first"),
            context,
            3,
        );
        state.begin_attempt();
        state
    }

    #[test]
    fn test_first_prompt_has_requirements_and_no_feedback() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let prompt = generator(client, false).render_prompt(&state()).unwrap();

        assert!(prompt.contains("Users need secure login"));
        assert!(prompt.contains("Supporting document: brief.txt"));
        assert!(prompt.contains("\"tech_stack\": \"rust\""));
        assert!(!prompt.contains("Previous attempt"));
    }

    #[test]
    fn test_retry_prompt_carries_feedback() {
        let mut state = state();
        state.stories = vec![story("US001", &[])];
        let mut record = ValidationRecord::empty_backlog();
        record.score = 64.0;
        record.feedback.critical_issues = vec!["No story covers security".to_string()];
        record.feedback.missing_requirements = vec!["secure login".to_string()];
        record.feedback.recommendations = vec!["Add an authentication story".to_string()];
        record.issues.insert("US001".to_string(), vec!["Too vague".to_string()]);
        state.record_validation(record);
        state.prepare_retry();
        state.begin_attempt();

        let client = Arc::new(MockLlmClient::new(vec![]));
        let prompt = generator(client, false).render_prompt(&state).unwrap();

        assert!(prompt.contains("Previous attempt (iteration 2)"));
        assert!(prompt.contains("scored 64.0/100"));
        assert!(prompt.contains("- No story covers security"));
        assert!(prompt.contains("- secure login"));
        assert!(prompt.contains("- Add an authentication story"));
        assert!(prompt.contains("- US001: Too vague"));
        assert!(prompt.contains("As a user, I want feature US001"));
    }

    #[tokio::test]
    async fn test_generate_normalizes_and_renumbers() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse::tool(
            SUBMIT_STORIES,
            json!({"stories": [
                {"id": "A", "title": "Login", "description": "d", "acceptance_criteria": ["a"], "priority": "high", "estimated_points": 3},
                {"id": "B", "title": "As a user, I want x so that y", "description": "d", "dependencies": ["A"]}
            ]}),
        )]));

        let stories = generator(client, false).generate(&state()).await.unwrap();
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].id, "US001");
        assert!(stories[0].title.starts_with("As a user, I want Login"));
        assert_eq!(stories[0].acceptance_criteria.len(), 3);
        assert_eq!(stories[1].dependencies, vec!["US001"]);
    }

    #[tokio::test]
    async fn test_generate_fills_gaps_when_enabled() {
        let response = CompletionResponse::text(
            "```json\n{\"stories\": [{\"title\": \"As a user, I want a dashboard so that I see stats\", \"description\": \"d\"}]}\n```",
        );
        let client = Arc::new(MockLlmClient::new(vec![response]));

        let stories = generator(client, true).generate(&state()).await.unwrap();
        assert_eq!(stories.len(), 2);
        assert!(stories[1].title.contains("security"));
    }

    #[tokio::test]
    async fn test_generate_rejects_wrong_shape() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse::tool(
            SUBMIT_STORIES,
            json!({"backlog": []}),
        )]));

        let err = generator(client, false).generate(&state()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unparseable(_)));
    }
}
