//! Semantic assessment decoding and score combination

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::domain::{SourceAnalysis, ValidationStatus};

/// Largest bonus a strong multi-document analysis can add
const MAX_SOURCE_BONUS: f64 = 10.0;

/// Source-analysis mean above which the bonus starts
const SOURCE_BONUS_FLOOR: f64 = 70.0;

/// The model's judgement of a backlog, normalized from its JSON answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticAssessment {
    /// None when the model omitted or garbled the score
    pub score: Option<f64>,
    pub critical_issues: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
    pub story_issues: BTreeMap<String, Vec<String>>,
    pub source_analysis: Option<SourceAnalysis>,
    /// Produced by the fallback path, not by the model
    pub degraded: bool,
}

impl SemanticAssessment {
    /// Fallback when the scoring call fails
    pub fn degraded(reason: &str, fallback_score: f64) -> Self {
        debug!(%reason, fallback_score, "SemanticAssessment::degraded: called");
        Self {
            score: Some(fallback_score),
            critical_issues: vec![format!("Validation model call failed: {}", reason)],
            recommendations: vec!["Manual review required - validation system error".to_string()],
            degraded: true,
            ..Self::default()
        }
    }

    /// Decode leniently; unknown or mistyped fields become empty
    pub fn from_value(value: &Value) -> Self {
        let score = value
            .get("validation_score")
            .or_else(|| value.get("score"))
            .and_then(to_f64)
            .filter(|s| s.is_finite());

        let source_analysis = value
            .get("source_analysis")
            .or_else(|| value.get("multimodal_analysis"))
            .filter(|v| v.is_object())
            .map(|v| SourceAnalysis {
                source_coverage_score: v.get("source_coverage_score").and_then(to_f64).unwrap_or(50.0),
                integration_quality: v.get("integration_quality").and_then(to_f64).unwrap_or(50.0),
                conflict_resolution_score: v.get("conflict_resolution_score").and_then(to_f64).unwrap_or(50.0),
            });

        let story_issues = match value.get("story_issues") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(id, issues)| (id.clone(), strings(Some(issues))))
                .filter(|(_, issues)| !issues.is_empty())
                .collect(),
            _ => BTreeMap::new(),
        };

        Self {
            score,
            critical_issues: strings(value.get("critical_issues")),
            missing_requirements: strings(value.get("missing_requirements")),
            recommendations: strings(value.get("recommendations")),
            warnings: strings(value.get("warnings")),
            story_issues,
            source_analysis,
            degraded: false,
        }
    }

    /// Model score (or fallback) plus the source-analysis bonus
    pub fn adjusted_score(&self, config: &ValidationConfig) -> f64 {
        let base = self.score.unwrap_or(config.missing_score);
        base + self.source_analysis.map(|a| source_bonus(&a)).unwrap_or(0.0)
    }
}

/// Bonus for multi-document backlogs whose source analysis is strong
pub fn source_bonus(analysis: &SourceAnalysis) -> f64 {
    let mean = analysis.mean();
    if mean > SOURCE_BONUS_FLOOR {
        ((mean - SOURCE_BONUS_FLOOR) / 3.0).min(MAX_SOURCE_BONUS)
    } else {
        0.0
    }
}

/// Subtract the capped structural penalty and clamp to [0, 100]
pub fn combine_score(semantic: f64, structural_issues: usize, config: &ValidationConfig) -> f64 {
    let penalty = (structural_issues as f64 * config.penalty_per_issue).min(config.max_penalty);
    (semantic - penalty).clamp(0.0, 100.0)
}

/// Classify a final score
pub fn derive_status(score: f64, structural_issues: usize, config: &ValidationConfig) -> ValidationStatus {
    if score >= config.approve_score && structural_issues < config.max_approve_issues {
        ValidationStatus::Approved
    } else if score >= config.revise_score {
        ValidationStatus::NeedsRevision
    } else {
        ValidationStatus::NeedsClarification
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Object(_) => Some(v.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ValidationConfig {
        ValidationConfig::default()
    }

    #[test]
    fn test_status_thresholds_exact() {
        let c = config();
        assert_eq!(derive_status(80.0, 0, &c), ValidationStatus::Approved);
        assert_eq!(derive_status(80.0, 2, &c), ValidationStatus::Approved);
        assert_eq!(derive_status(80.0, 3, &c), ValidationStatus::NeedsRevision);
        assert_eq!(derive_status(79.9, 0, &c), ValidationStatus::NeedsRevision);
        assert_eq!(derive_status(60.0, 10, &c), ValidationStatus::NeedsRevision);
        assert_eq!(derive_status(59.9, 0, &c), ValidationStatus::NeedsClarification);
    }

    #[test]
    fn test_penalty_capped_and_clamped() {
        let c = config();
        assert_eq!(combine_score(90.0, 0, &c), 90.0);
        assert_eq!(combine_score(90.0, 5, &c), 80.0);
        assert_eq!(combine_score(90.0, 40, &c), 60.0);
        assert_eq!(combine_score(10.0, 40, &c), 0.0);
        assert_eq!(combine_score(120.0, 0, &c), 100.0);
    }

    #[test]
    fn test_from_value_lenient() {
        let value = json!({
            "validation_score": "82.5",
            "critical_issues": ["Missing admin story", 7, ""],
            "missing_requirements": "reporting",
            "recommendations": [],
            "story_issues": {"US001": ["vague"], "US002": []},
            "source_analysis": {"source_coverage_score": 100, "integration_quality": 100, "conflict_resolution_score": "100"}
        });
        let assessment = SemanticAssessment::from_value(&value);

        assert_eq!(assessment.score, Some(82.5));
        assert_eq!(assessment.critical_issues, vec!["Missing admin story"]);
        assert_eq!(assessment.missing_requirements, vec!["reporting"]);
        assert_eq!(assessment.story_issues.len(), 1);
        assert!(!assessment.degraded);
        // mean 100 -> bonus capped at 10
        assert_eq!(assessment.adjusted_score(&config()), 92.5);
    }

    #[test]
    fn test_missing_score_uses_fallback() {
        let assessment = SemanticAssessment::from_value(&json!({"validation_score": "high"}));
        assert_eq!(assessment.score, None);
        assert_eq!(assessment.adjusted_score(&config()), 70.0);
    }

    #[test]
    fn test_source_bonus() {
        let weak = SourceAnalysis {
            source_coverage_score: 70.0,
            integration_quality: 70.0,
            conflict_resolution_score: 70.0,
        };
        assert_eq!(source_bonus(&weak), 0.0);

        let good = SourceAnalysis {
            source_coverage_score: 85.0,
            integration_quality: 85.0,
            conflict_resolution_score: 85.0,
        };
        assert!((source_bonus(&good) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_assessment() {
        let assessment = SemanticAssessment::degraded("timeout", 60.0);
        assert!(assessment.degraded);
        assert_eq!(assessment.score, Some(60.0));
        assert!(assessment.critical_issues[0].contains("timeout"));
        assert!(assessment.recommendations[0].contains("Manual review"));
    }
}
