//! Domain types for StoryForge
//!
//! Stories, tasks, the requirements bundle, validation records, and the
//! per-run workflow state.

mod priority;
mod requirements;
pub mod state;
pub mod story;
pub mod task;
mod validation;

pub use priority::Priority;
pub use requirements::{RequirementsBundle, SupportingDocument};
pub use state::{Phase, ProjectContext, WorkflowState};
pub use story::{STORY_POINTS, Story};
pub use task::{Task, TaskCategory};
pub use validation::{SourceAnalysis, ValidationFeedback, ValidationRecord, ValidationStatus};
