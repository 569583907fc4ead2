//! StoryForge - requirements to backlog
//!
//! StoryForge turns free-form project requirements into a validated backlog
//! of agile user stories and development tasks. A language model drafts the
//! stories, a validator scores them, and a feedback loop retries with the
//! validator's findings until the backlog is accepted or handed to a human.
//!
//! # Core Concepts
//!
//! - **Generate, validate, decide**: each attempt is scored and a pure
//!   transition function picks accept, retry or escalate
//! - **Degrade, don't stall**: a failed scoring or decomposition call falls
//!   back to deterministic output instead of aborting the run
//! - **Every story gets tasks**: stories the model skips receive a fallback
//!   backend/frontend/testing triplet
//!
//! # Modules
//!
//! - [`llm`] - LLM client trait, Anthropic and OpenAI transports, structured output
//! - [`generation`] - story generation and normalisation
//! - [`validation`] - structural checks and semantic scoring
//! - [`decomposition`] - story to task decomposition
//! - [`workflow`] - the feedback loop engine
//! - [`persistence`] - JSON and SQLite output sinks
//! - [`review`] - pull-request review against backlog tasks
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod decomposition;
pub mod domain;
pub mod generation;
pub mod llm;
pub mod persistence;
pub mod prompts;
pub mod review;
pub mod validation;
pub mod workflow;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use decomposition::TaskDecomposer;
pub use domain::{
    Phase, Priority, ProjectContext, RequirementsBundle, Story, SupportingDocument, Task, TaskCategory,
    ValidationRecord, ValidationStatus, WorkflowState,
};
pub use generation::StoryGenerator;
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use persistence::{JsonFileSink, PersistenceSink, ProjectMetadata, SqliteSink, StorageError, StoredProject};
pub use review::{CodeReviewer, PullRequestEvent, ReviewReport, ReviewStatus, extract_task_id, render_comment};
pub use validation::StoryValidator;
pub use workflow::{
    CancelToken, EngineConfig, RunReport, StageTimings, StorageOutcome, Transition, WorkflowEngine, next_state,
};
