//! Prompt template system
//!
//! Loads and renders `.pmt` (prompt template) files for each pipeline stage.
//!
//! Template loading chain:
//! 1. `{prompts.dir}/{name}.pmt` (configured override)
//! 2. Embedded fallback compiled into the binary
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;

/// Story generation template
pub const GENERATE_STORIES: &str = "generate-stories";

/// Semantic validation template
pub const VALIDATE_STORIES: &str = "validate-stories";

/// Task decomposition template
pub const DECOMPOSE_TASKS: &str = "decompose-tasks";

/// Pull-request review template
pub const REVIEW_SUBMISSION: &str = "review-submission";
