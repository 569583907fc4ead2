//! Task decomposition
//!
//! Accepted stories are sent to the model in batches. A batch that fails
//! falls back to deterministic task triplets, and any story still without
//! a task afterwards gets one too, so every story ends up covered.

pub mod fallback;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DecompositionConfig;
use crate::domain::task::{clamp_hours, renumber_tasks};
use crate::domain::{Priority, ProjectContext, Story, Task, TaskCategory};
use crate::generation::normalize::string_list;
use crate::llm::structured::take_array;
use crate::llm::{GenerationError, StructuredCaller, StructuredRequest};
use crate::prompts::{self, PromptLoader};

pub use fallback::fallback_tasks;

const SYSTEM_PROMPT: &str = "You are a technical lead who breaks user stories into well-sized development tasks.";

/// Name of the structured-output tool for decomposition
pub const SUBMIT_TASKS: &str = "submit_tasks";

/// Hours assumed when the model omits an estimate
const DEFAULT_HOURS: f64 = 8.0;

/// JSON schema for a decomposition batch
pub fn tasks_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "T001, T002, ..." },
                        "story_id": { "type": "string" },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "category": { "type": "string", "enum": ["backend", "frontend", "testing", "devops"] },
                        "estimated_hours": { "type": "number", "minimum": 4, "maximum": 16 },
                        "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                        "dependencies": { "type": "array", "items": { "type": "string" } },
                        "acceptance_criteria": { "type": "array", "items": { "type": "string" } },
                        "technical_notes": { "type": "string" }
                    },
                    "required": ["id", "story_id", "title", "category", "estimated_hours"]
                }
            }
        },
        "required": ["tasks"]
    })
}

/// Task as the model emitted it
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTask {
    pub id: Option<Value>,
    pub story_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub estimated_hours: Option<Value>,
    pub priority: Option<String>,
    pub dependencies: Option<Value>,
    pub acceptance_criteria: Option<Value>,
    pub technical_notes: Option<String>,
}

impl RawTask {
    /// Repair into a `Task` owned by one of the batch's stories
    ///
    /// A missing or unknown story id is reassigned to the batch's first story.
    pub fn normalize(self, batch: &[Story]) -> Task {
        let story = self
            .story_id
            .as_deref()
            .map(str::trim)
            .and_then(|id| batch.iter().find(|s| s.id == id))
            .or_else(|| batch.first());

        let id = match self.id {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let hours = match self.estimated_hours {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_HOURS),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_HOURS),
            _ => DEFAULT_HOURS,
        };

        let priority = self
            .priority
            .map(Priority::from)
            .or_else(|| story.map(|s| s.priority.clone()))
            .unwrap_or_default();

        let mut acceptance_criteria = string_list(self.acceptance_criteria);
        if acceptance_criteria.is_empty() {
            acceptance_criteria.push("Implementation matches the task description".to_string());
        }

        Task {
            id,
            story_id: story.map(|s| s.id.clone()).unwrap_or_default(),
            title: self.title.unwrap_or_default().trim().to_string(),
            description: self.description.unwrap_or_default().trim().to_string(),
            category: self.category.map(TaskCategory::from).unwrap_or_default(),
            estimated_hours: clamp_hours(hours),
            priority,
            dependencies: string_list(self.dependencies),
            acceptance_criteria,
            technical_notes: self.technical_notes.unwrap_or_default().trim().to_string(),
        }
    }
}

#[derive(Serialize)]
struct DecompositionContext {
    story_count: usize,
    stories: String,
    project_context: String,
    schema: String,
}

/// Expands accepted stories into implementation tasks
pub struct TaskDecomposer {
    caller: StructuredCaller,
    prompts: Arc<PromptLoader>,
    config: DecompositionConfig,
    max_tokens: u32,
}

impl TaskDecomposer {
    pub fn new(caller: StructuredCaller, prompts: Arc<PromptLoader>, config: DecompositionConfig, max_tokens: u32) -> Self {
        debug!(?config, "TaskDecomposer::new: called");
        Self {
            caller,
            prompts,
            config,
            max_tokens,
        }
    }

    /// Decompose every story; never fails
    pub async fn decompose(&self, stories: &[Story], project_context: &ProjectContext) -> Vec<Task> {
        debug!(count = stories.len(), "TaskDecomposer::decompose: called");
        if stories.is_empty() {
            return Vec::new();
        }

        let batches: Vec<&[Story]> = stories.chunks(self.config.batch_size.max(1)).collect();
        debug!(batches = batches.len(), parallel = self.config.parallel, "decompose: batching");

        let results: Vec<Vec<Vec<Task>>> = if self.config.parallel {
            futures::future::join_all(batches.iter().map(|b| self.decompose_batch(b, project_context))).await
        } else {
            let mut results = Vec::with_capacity(batches.len());
            for batch in &batches {
                results.push(self.decompose_batch(batch, project_context).await);
            }
            results
        };

        let mut groups: Vec<Vec<Task>> = results.into_iter().flatten().collect();

        let covered: HashSet<&str> = groups.iter().flatten().map(|t| t.story_id.as_str()).collect();
        let uncovered: Vec<&Story> = stories.iter().filter(|s| !covered.contains(s.id.as_str())).collect();
        if !uncovered.is_empty() {
            warn!(count = uncovered.len(), "decompose: stories without tasks, adding fallback tasks");
            let extra: Vec<Vec<Task>> = uncovered.into_iter().map(fallback_tasks).collect();
            groups.extend(extra);
        }

        let tasks = renumber_tasks(groups);
        info!(stories = stories.len(), tasks = tasks.len(), "Decomposed stories into tasks");
        tasks
    }

    /// One batch as task groups: the model's answer, or a triplet per story
    async fn decompose_batch(&self, batch: &[Story], project_context: &ProjectContext) -> Vec<Vec<Task>> {
        debug!(count = batch.len(), "decompose_batch: called");
        match self.request_batch(batch, project_context).await {
            Ok(items) => {
                let tasks: Vec<Task> = items
                    .into_iter()
                    .enumerate()
                    .filter_map(|(idx, item)| match serde_json::from_value::<RawTask>(item) {
                        Ok(raw) => Some(raw.normalize(batch)),
                        Err(e) => {
                            warn!(index = idx, error = %e, "decompose_batch: skipping undecodable task");
                            None
                        }
                    })
                    .collect();
                vec![tasks]
            }
            Err(e) => {
                warn!(error = %e, count = batch.len(), "decompose_batch: model call failed, using fallback tasks");
                batch.iter().map(fallback_tasks).collect()
            }
        }
    }

    async fn request_batch(&self, batch: &[Story], project_context: &ProjectContext) -> Result<Vec<Value>, GenerationError> {
        let context = DecompositionContext {
            story_count: batch.len(),
            stories: to_pretty_json(&batch)?,
            project_context: to_pretty_json(project_context)?,
            schema: to_pretty_json(&tasks_schema())?,
        };

        let user_prompt = self
            .prompts
            .render(prompts::DECOMPOSE_TASKS, &context)
            .map_err(|e| GenerationError::Prompt(e.to_string()))?;

        let value = self
            .caller
            .generate(StructuredRequest {
                name: SUBMIT_TASKS.to_string(),
                description: "Submit the development tasks for these stories".to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt,
                schema: tasks_schema(),
                max_tokens: self.max_tokens,
            })
            .await?;

        take_array(value, "tasks")
    }
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, GenerationError> {
    serde_json::to_string_pretty(value).map_err(|e| GenerationError::Prompt(e.to_string()))
}
