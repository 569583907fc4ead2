//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const GENERATE_STORIES_PMT: &str = include_str!("../../prompts/generate-stories.pmt");

pub const VALIDATE_STORIES_PMT: &str = include_str!("../../prompts/validate-stories.pmt");

pub const DECOMPOSE_TASKS_PMT: &str = include_str!("../../prompts/decompose-tasks.pmt");

pub const REVIEW_SUBMISSION_PMT: &str = include_str!("../../prompts/review-submission.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        super::GENERATE_STORIES => Some(GENERATE_STORIES_PMT),
        super::VALIDATE_STORIES => Some(VALIDATE_STORIES_PMT),
        super::DECOMPOSE_TASKS => Some(DECOMPOSE_TASKS_PMT),
        super::REVIEW_SUBMISSION => Some(REVIEW_SUBMISSION_PMT),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
