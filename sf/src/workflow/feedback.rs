//! Feedback carried from one validation pass into the next generation prompt

use serde::Serialize;

use crate::domain::WorkflowState;

/// Issues attached to one story
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryIssues {
    pub story_id: String,
    pub issues: Vec<String>,
}

/// What the generator is told about its previous attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackPayload {
    /// Previous score, one decimal
    pub score: f64,
    pub critical_issues: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
    pub structural_issues: Vec<String>,
    pub story_issues: Vec<StoryIssues>,
    pub improvement_instructions: Vec<String>,
}

impl FeedbackPayload {
    /// Payload for a retry attempt; None on the first attempt
    pub fn for_retry(state: &WorkflowState) -> Option<Self> {
        if !state.is_retry() {
            return None;
        }
        let validation = state.validation.as_ref()?;
        let feedback = &validation.feedback;

        Some(Self {
            score: (validation.score * 10.0).round() / 10.0,
            critical_issues: feedback.critical_issues.clone(),
            missing_requirements: feedback.missing_requirements.clone(),
            recommendations: feedback.recommendations.clone(),
            warnings: feedback.warnings.clone(),
            structural_issues: feedback.structural_issues.clone(),
            story_issues: validation
                .issues
                .iter()
                .filter(|(_, issues)| !issues.is_empty())
                .map(|(id, issues)| StoryIssues {
                    story_id: id.clone(),
                    issues: issues.clone(),
                })
                .collect(),
            improvement_instructions: feedback.improvement_instructions.clone(),
        })
    }
}
