//! Mutable record threaded through one workflow run

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RequirementsBundle, Story, Task, ValidationRecord};

/// Free-form project metadata (tech stack, team size), passed to prompts
pub type ProjectContext = BTreeMap<String, serde_json::Value>;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Init,
    Generating,
    Validating,
    Retrying,
    Accepted,
    Decomposing,
    Persisting,
    Complete,
    Escalated,
    Failed,
    Aborted,
}

impl Phase {
    /// No further stage runs from here
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Escalated | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Retrying => "retrying",
            Self::Accepted => "accepted",
            Self::Decomposing => "decomposing",
            Self::Persisting => "persisting",
            Self::Complete => "complete",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// State of one end-to-end request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub requirements: RequirementsBundle,
    pub project_context: ProjectContext,
    /// Current candidate backlog, replaced wholesale per attempt
    pub stories: Vec<Story>,
    /// Backlog of the attempt before the current one, prompt context only
    pub previous_stories: Vec<Story>,
    pub tasks: Vec<Task>,
    pub validation: Option<ValidationRecord>,
    /// Generation attempts started so far
    pub iteration_count: u32,
    pub max_iterations: u32,
    /// One score per completed validation pass, oldest first
    pub score_history: Vec<f64>,
    pub last_error: Option<String>,
    pub phase: Phase,
}

impl WorkflowState {
    pub fn new(requirements: RequirementsBundle, project_context: ProjectContext, max_iterations: u32) -> Self {
        debug!(max_iterations, "WorkflowState::new: called");
        Self {
            requirements,
            project_context,
            stories: Vec::new(),
            previous_stories: Vec::new(),
            tasks: Vec::new(),
            validation: None,
            iteration_count: 0,
            max_iterations: max_iterations.max(1),
            score_history: Vec::new(),
            last_error: None,
            phase: Phase::Init,
        }
    }

    /// Start a generation attempt
    pub fn begin_attempt(&mut self) {
        self.iteration_count += 1;
        self.phase = Phase::Generating;
        debug!(iteration = self.iteration_count, "WorkflowState::begin_attempt: called");
    }

    /// Replace the backlog with a fresh generation result
    pub fn replace_stories(&mut self, stories: Vec<Story>) {
        self.stories = stories;
        self.phase = Phase::Validating;
    }

    /// Record a finished validation pass
    ///
    /// The score is appended to the history after the transition has been
    /// decided, so the history seen by the transition holds only earlier passes.
    pub fn record_validation(&mut self, record: ValidationRecord) {
        self.score_history.push(record.score);
        self.validation = Some(record);
    }

    /// Keep the current backlog around as context for the next attempt
    pub fn prepare_retry(&mut self) {
        debug!(iteration = self.iteration_count, "WorkflowState::prepare_retry: called");
        self.previous_stories = self.stories.clone();
        self.phase = Phase::Retrying;
    }

    /// Hard generation failure: terminal for this run
    pub fn fail(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.stories.clear();
        self.phase = Phase::Failed;
    }

    pub fn is_retry(&self) -> bool {
        self.iteration_count > 1
    }
}
