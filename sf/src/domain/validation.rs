//! Validation record produced by each validation pass

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Overall classification of a backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Approved,
    NeedsRevision,
    NeedsClarification,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::NeedsRevision => write!(f, "needs_revision"),
            Self::NeedsClarification => write!(f, "needs_clarification"),
        }
    }
}

/// Itemized feedback handed back to the generator on retry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationFeedback {
    pub critical_issues: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
    /// Locally detected defects (format, fields, dependencies, coverage)
    pub structural_issues: Vec<String>,
    pub improvement_instructions: Vec<String>,
}

/// Multi-document coverage assessment reported by the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceAnalysis {
    pub source_coverage_score: f64,
    pub integration_quality: f64,
    pub conflict_resolution_score: f64,
}

impl SourceAnalysis {
    pub fn mean(&self) -> f64 {
        (self.source_coverage_score + self.integration_quality + self.conflict_resolution_score) / 3.0
    }
}

/// Result of one validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub status: ValidationStatus,
    /// Final score in [0, 100]
    pub score: f64,
    /// Issues keyed by story id
    pub issues: BTreeMap<String, Vec<String>>,
    pub feedback: ValidationFeedback,
    /// Score the model gave before adjustments
    pub semantic_score: f64,
    /// Structural issue count behind the penalty
    pub structural_issue_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_analysis: Option<SourceAnalysis>,
    /// Semantic scoring failed and a fallback score was used
    #[serde(default)]
    pub degraded: bool,
}

impl ValidationRecord {
    /// Record for a pass that produced no stories at all
    pub fn empty_backlog() -> Self {
        Self {
            status: ValidationStatus::NeedsClarification,
            score: 0.0,
            issues: BTreeMap::new(),
            feedback: ValidationFeedback {
                critical_issues: vec!["No user stories generated".to_string()],
                improvement_instructions: vec!["Generate user stories covering the requirements".to_string()],
                ..ValidationFeedback::default()
            },
            semantic_score: 0.0,
            structural_issue_count: 0,
            source_analysis: None,
            degraded: false,
        }
    }
}
