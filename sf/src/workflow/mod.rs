//! Workflow engine
//!
//! Drives one request through generate -> validate -> accept / retry /
//! escalate, then decomposes and persists an accepted backlog. The engine
//! holds only configuration and shared handles, so independent runs may
//! execute concurrently on one engine.

mod cancel;
mod feedback;
pub mod transition;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Config, DecompositionConfig, ValidationConfig, WorkflowConfig};
use crate::decomposition::TaskDecomposer;
use crate::domain::{Phase, ProjectContext, RequirementsBundle, Story, Task, ValidationStatus, WorkflowState};
use crate::generation::StoryGenerator;
use crate::llm::{LlmClient, StructuredCaller};
use crate::persistence::{PersistenceSink, ProjectMetadata};
use crate::prompts::PromptLoader;
use crate::validation::StoryValidator;

pub use cancel::CancelToken;
pub use feedback::{FeedbackPayload, StoryIssues};
pub use transition::{AcceptReason, EscalationReason, Transition, TransitionPolicy, next_state};

/// Everything the engine needs; credentials are resolved before this point
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workflow: WorkflowConfig,
    pub validation: ValidationConfig,
    pub decomposition: DecompositionConfig,
    /// Response budget per model call
    pub max_tokens: u32,
    /// Timeout for each model call
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            workflow: config.workflow.clone(),
            validation: config.validation.clone(),
            decomposition: config.decomposition.clone(),
            max_tokens: config.llm.max_tokens,
            call_timeout: Duration::from_millis(config.llm.timeout_ms),
        }
    }
}

/// Wall-clock milliseconds spent per stage, summed over attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub generation_ms: u64,
    pub validation_ms: u64,
    pub decomposition_ms: u64,
    pub persistence_ms: u64,
    pub total_ms: u64,
}

/// What happened to the output sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StorageOutcome {
    /// No sink configured, or the run ended before persisting
    #[default]
    Skipped,
    Stored { project_id: String },
    Failed { error: String },
}

/// Handoff record for a run that needs a human
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: EscalationReason,
    pub message: String,
    pub score: f64,
    pub iterations: u32,
}

/// Result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub stories: Vec<Story>,
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
    pub iterations: u32,
    pub score_history: Vec<f64>,
    /// One entry per completed validation pass
    pub transitions: Vec<Transition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_reason: Option<AcceptReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    pub storage: StorageOutcome,
    pub durations: StageTimings,
}

impl RunReport {
    fn from_state(state: WorkflowState) -> Self {
        let validation = state.validation.as_ref();
        Self {
            success: !matches!(state.phase, Phase::Failed | Phase::Aborted),
            error: state.last_error.clone(),
            phase: state.phase,
            project_id: None,
            validation_score: validation.map(|v| v.score),
            validation_status: validation.map(|v| v.status),
            iterations: state.iteration_count,
            score_history: state.score_history,
            transitions: Vec::new(),
            accept_reason: None,
            escalation: None,
            storage: StorageOutcome::Skipped,
            durations: StageTimings::default(),
            stories: state.stories,
            tasks: state.tasks,
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Runs requirements through the story pipeline
pub struct WorkflowEngine {
    client: Arc<dyn LlmClient>,
    config: EngineConfig,
    prompts: Arc<PromptLoader>,
    sink: Option<Arc<dyn PersistenceSink>>,
    policy: TransitionPolicy,
}

impl WorkflowEngine {
    pub fn new(client: Arc<dyn LlmClient>, config: EngineConfig) -> Self {
        debug!(?config, "WorkflowEngine::new: called");
        let policy = TransitionPolicy::from(&config.workflow);
        Self {
            client,
            config,
            prompts: Arc::new(PromptLoader::embedded_only()),
            sink: None,
            policy,
        }
    }

    /// Store finished backlogs in `sink`
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Render prompts through `prompts` instead of the embedded templates
    pub fn with_prompts(mut self, prompts: Arc<PromptLoader>) -> Self {
        self.prompts = prompts;
        self
    }

    fn caller(&self) -> StructuredCaller {
        StructuredCaller::new(self.client.clone(), self.config.call_timeout)
    }

    /// Run to completion
    pub async fn run(&self, requirements: RequirementsBundle, project_context: ProjectContext) -> RunReport {
        self.run_with_cancel(requirements, project_context, &CancelToken::new()).await
    }

    /// Run, stopping at the next stage boundary once `cancel` fires
    pub async fn run_with_cancel(
        &self,
        requirements: RequirementsBundle,
        project_context: ProjectContext,
        cancel: &CancelToken,
    ) -> RunReport {
        debug!(max_iterations = self.config.workflow.max_iterations, "WorkflowEngine::run: called");
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let mut transitions = Vec::new();
        let mut accept_reason = None;
        let mut escalation = None;

        let generator = StoryGenerator::new(
            self.caller(),
            self.prompts.clone(),
            self.config.max_tokens,
            self.config.workflow.fill_coverage_gaps,
        );
        let validator = StoryValidator::new(
            self.caller(),
            self.prompts.clone(),
            self.config.validation.clone(),
            self.config.max_tokens,
        );

        let mut state = WorkflowState::new(requirements, project_context, self.config.workflow.max_iterations);

        loop {
            if abort_if_cancelled(&mut state, cancel) {
                break;
            }

            state.begin_attempt();
            info!(iteration = state.iteration_count, max = state.max_iterations, "Generating user stories");

            let stage = Instant::now();
            let generated = generator.generate(&state).await;
            timings.generation_ms += elapsed_ms(stage);
            match generated {
                Ok(stories) => state.replace_stories(stories),
                Err(e) => {
                    error!(iteration = state.iteration_count, error = %e, "Story generation failed");
                    state.fail(format!("Story generation failed: {}", e));
                    break;
                }
            }

            if abort_if_cancelled(&mut state, cancel) {
                break;
            }

            let stage = Instant::now();
            let record = validator.validate(&state.requirements, &state.stories).await;
            timings.validation_ms += elapsed_ms(stage);

            let transition = self.policy.next_state(
                &record,
                state.iteration_count,
                state.max_iterations,
                &state.score_history,
            );
            info!(
                iteration = state.iteration_count,
                score = record.score,
                status = %record.status,
                ?transition,
                "Validation pass complete"
            );
            let score = record.score;
            state.record_validation(record);
            transitions.push(transition);

            match transition {
                Transition::Accept(reason) => {
                    state.phase = Phase::Accepted;
                    accept_reason = Some(reason);
                    break;
                }
                Transition::Retry => state.prepare_retry(),
                Transition::Escalate(reason) => {
                    warn!(%reason, score, iterations = state.iteration_count, "Escalating to human review");
                    state.phase = Phase::Escalated;
                    escalation = Some(Escalation {
                        reason,
                        message: reason.to_string(),
                        score,
                        iterations: state.iteration_count,
                    });
                    break;
                }
            }
        }

        let mut storage = StorageOutcome::Skipped;
        let mut project_id = None;

        if state.phase == Phase::Accepted && !abort_if_cancelled(&mut state, cancel) {
            state.phase = Phase::Decomposing;
            let decomposer = TaskDecomposer::new(
                self.caller(),
                self.prompts.clone(),
                self.config.decomposition.clone(),
                self.config.max_tokens,
            );
            let stage = Instant::now();
            state.tasks = decomposer.decompose(&state.stories, &state.project_context).await;
            timings.decomposition_ms = elapsed_ms(stage);

            if !abort_if_cancelled(&mut state, cancel) {
                state.phase = Phase::Persisting;
                let stage = Instant::now();
                storage = self.persist(&state).await;
                timings.persistence_ms = elapsed_ms(stage);
                if let StorageOutcome::Stored { project_id: id } = &storage {
                    project_id = Some(id.clone());
                }
                state.phase = Phase::Complete;
            }
        }

        debug_assert!(state.phase.is_terminal(), "run ended in phase {}", state.phase);
        timings.total_ms = elapsed_ms(started);
        info!(
            phase = %state.phase,
            iterations = state.iteration_count,
            stories = state.stories.len(),
            tasks = state.tasks.len(),
            total_ms = timings.total_ms,
            "Workflow finished"
        );

        RunReport {
            project_id,
            transitions,
            accept_reason,
            escalation,
            storage,
            durations: timings,
            ..RunReport::from_state(state)
        }
    }

    async fn persist(&self, state: &WorkflowState) -> StorageOutcome {
        let Some(sink) = &self.sink else {
            debug!("persist: no sink configured");
            return StorageOutcome::Skipped;
        };

        let score = state.validation.as_ref().map(|v| v.score).unwrap_or_default();
        let metadata = ProjectMetadata::new(&state.project_context, score, state.iteration_count, "complete");
        match sink.persist(&metadata, &state.stories, &state.tasks).await {
            Ok(project_id) => StorageOutcome::Stored { project_id },
            Err(e) => {
                warn!(error = %e, "Persisting the backlog failed; result kept in memory");
                StorageOutcome::Failed { error: e.to_string() }
            }
        }
    }
}

/// Move to Aborted when cancellation was requested
fn abort_if_cancelled(state: &mut WorkflowState, cancel: &CancelToken) -> bool {
    if cancel.is_cancelled() {
        warn!(phase = %state.phase, iteration = state.iteration_count, "Workflow cancelled");
        state.last_error = Some("workflow cancelled".to_string());
        state.phase = Phase::Aborted;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::SUBMIT_TASKS;
    use crate::generation::SUBMIT_STORIES;
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use crate::llm::{CompletionResponse, LlmError};
    use crate::persistence::{JsonFileSink, StorageError};
    use crate::validation::SUBMIT_VALIDATION;
    use async_trait::async_trait;
    use serde_json::json;

    fn stories_answer(count: usize) -> CompletionResponse {
        let stories: Vec<_> = (1..=count)
            .map(|i| {
                json!({
                    "id": format!("US{:03}", i),
                    "title": format!("As a user, I want feature {} so that I get value", i),
                    "description": "Details",
                    "acceptance_criteria": ["One", "Two", "Three"],
                    "priority": "high",
                    "estimated_points": 3
                })
            })
            .collect();
        CompletionResponse::tool(SUBMIT_STORIES, json!({ "stories": stories }))
    }

    fn validation_answer(score: f64) -> CompletionResponse {
        CompletionResponse::tool(
            SUBMIT_VALIDATION,
            json!({
                "validation_score": score,
                "critical_issues": [],
                "missing_requirements": [],
                "recommendations": []
            }),
        )
    }

    fn tasks_answer() -> CompletionResponse {
        CompletionResponse::tool(
            SUBMIT_TASKS,
            json!({"tasks": [
                {"id": "T001", "story_id": "US001", "title": "API", "category": "backend", "estimated_hours": 8},
                {"id": "T002", "story_id": "US001", "title": "UI", "category": "frontend", "estimated_hours": 6, "dependencies": ["T001"]}
            ]}),
        )
    }

    fn engine(client: Arc<MockLlmClient>, max_iterations: u32) -> WorkflowEngine {
        let mut config = EngineConfig::default();
        config.workflow.max_iterations = max_iterations;
        config.call_timeout = Duration::from_secs(5);
        WorkflowEngine::new(client, config)
    }

    fn requirements() -> RequirementsBundle {
        RequirementsBundle::new("A simple notes app")
    }

    #[tokio::test]
    async fn test_accepts_on_first_pass() {
        let client = Arc::new(MockLlmClient::new(vec![stories_answer(1), validation_answer(90.0), tasks_answer()]));
        let report = engine(client.clone(), 3).run(requirements(), ProjectContext::new()).await;

        assert!(report.success);
        assert_eq!(report.phase, Phase::Complete);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.accept_reason, Some(AcceptReason::Approved));
        assert_eq!(report.tasks.len(), 2);
        assert_eq!(report.score_history, vec![90.0]);
        assert_eq!(report.storage, StorageOutcome::Skipped);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_then_accept() {
        let client = Arc::new(MockLlmClient::new(vec![
            stories_answer(1),
            validation_answer(65.0),
            stories_answer(2),
            validation_answer(82.0),
            tasks_answer(),
        ]));
        let report = engine(client.clone(), 3).run(requirements(), ProjectContext::new()).await;

        assert_eq!(report.phase, Phase::Complete);
        assert_eq!(report.iterations, 2);
        assert_eq!(
            report.transitions,
            vec![Transition::Retry, Transition::Accept(AcceptReason::Approved)]
        );
        assert_eq!(report.stories.len(), 2);
        // the uncovered second story gets fallback tasks
        assert_eq!(report.tasks.len(), 5);

        let retry_prompt = &client.requests()[2].messages[0].content;
        assert!(retry_prompt.contains("scored 65.0/100"));
    }

    #[tokio::test]
    async fn test_escalates_when_too_low() {
        let client = Arc::new(MockLlmClient::new(vec![stories_answer(1), validation_answer(30.0)]));
        let report = engine(client, 3).run(requirements(), ProjectContext::new()).await;

        assert!(report.success);
        assert_eq!(report.phase, Phase::Escalated);
        assert!(report.tasks.is_empty());
        assert_eq!(report.stories.len(), 1);
        let escalation = report.escalation.unwrap();
        assert_eq!(escalation.reason, EscalationReason::QualityTooLow);
        assert_eq!(escalation.iterations, 1);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_run() {
        let client = Arc::new(MockLlmClient::scripted(vec![MockReply::Fail(LlmError::ApiError {
            status: 500,
            message: "boom".to_string(),
        })]));
        let report = engine(client, 3).run(requirements(), ProjectContext::new()).await;

        assert!(!report.success);
        assert_eq!(report.phase, Phase::Failed);
        assert!(report.error.unwrap().contains("Story generation failed"));
        assert!(report.stories.is_empty());
        assert_eq!(report.iterations, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = engine(client.clone(), 3)
            .run_with_cancel(requirements(), ProjectContext::new(), &cancel)
            .await;

        assert!(!report.success);
        assert_eq!(report.phase, Phase::Aborted);
        assert_eq!(report.iterations, 0);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_persists_to_sink() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonFileSink::new(dir.path()));
        let client = Arc::new(MockLlmClient::new(vec![stories_answer(1), validation_answer(90.0), tasks_answer()]));
        let report = engine(client, 3)
            .with_sink(sink.clone())
            .run(requirements(), ProjectContext::new())
            .await;

        let id = report.project_id.clone().unwrap();
        assert_eq!(report.storage, StorageOutcome::Stored { project_id: id.clone() });
        let stored = JsonFileSink::load(sink.path_for(&id)).await.unwrap();
        assert_eq!(stored.tasks, report.tasks);
    }

    struct BrokenSink;

    #[async_trait]
    impl PersistenceSink for BrokenSink {
        async fn persist(&self, _: &ProjectMetadata, _: &[Story], _: &[Task]) -> Result<String, StorageError> {
            Err(StorageError::Unavailable("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_result() {
        let client = Arc::new(MockLlmClient::new(vec![stories_answer(1), validation_answer(90.0), tasks_answer()]));
        let report = engine(client, 3)
            .with_sink(Arc::new(BrokenSink))
            .run(requirements(), ProjectContext::new())
            .await;

        assert!(report.success);
        assert_eq!(report.phase, Phase::Complete);
        assert_eq!(report.tasks.len(), 2);
        assert!(report.project_id.is_none());
        assert!(matches!(report.storage, StorageOutcome::Failed { ref error } if error.contains("disk on fire")));
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let client = Arc::new(MockLlmClient::new(vec![stories_answer(1), validation_answer(30.0)]));
        let report = engine(client, 3).run(requirements(), ProjectContext::new()).await;
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["phase"], "escalated");
        assert_eq!(value["storage"]["status"], "skipped");
        assert_eq!(value["escalation"]["reason"], "quality_too_low");
        assert_eq!(value["transitions"][0]["action"], "escalate");
    }
}
