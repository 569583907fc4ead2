//! Loop transition policy
//!
//! A pure function of the latest validation, the attempt counter and the
//! score history. Checks run in a fixed order and the first match wins.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WorkflowConfig;
use crate::domain::{ValidationRecord, ValidationStatus};

/// Why a backlog was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptReason {
    /// The validator approved it
    Approved,
    /// The score alone was high enough
    FastPath,
    /// Out of attempts, but good enough to keep
    Salvaged,
    /// The score dropped, and the previous level was still acceptable
    DegradationStop,
}

/// Why a run was handed to a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MaxIterationsExhausted,
    QualityDegraded,
    QualityTooLow,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxIterationsExhausted => write!(f, "maximum iterations reached without an acceptable backlog"),
            Self::QualityDegraded => write!(f, "quality degraded between attempts"),
            Self::QualityTooLow => write!(f, "quality too low to retry"),
        }
    }
}

/// What the loop does next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum Transition {
    Accept(AcceptReason),
    Retry,
    Escalate(EscalationReason),
}

/// Score thresholds driving the transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionPolicy {
    pub fast_path_score: f64,
    pub salvage_score: f64,
    pub degradation_margin: f64,
    pub degradation_accept_score: f64,
    pub retry_floor: f64,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self::from(&WorkflowConfig::default())
    }
}

impl From<&WorkflowConfig> for TransitionPolicy {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            fast_path_score: config.fast_path_score,
            salvage_score: config.salvage_score,
            degradation_margin: config.degradation_margin,
            degradation_accept_score: config.degradation_accept_score,
            retry_floor: config.retry_floor,
        }
    }
}

impl TransitionPolicy {
    /// Decide the next step
    ///
    /// `iteration_count` counts the attempt just validated (1-based) and
    /// `score_history` holds only the passes before it.
    pub fn next_state(
        &self,
        validation: &ValidationRecord,
        iteration_count: u32,
        max_iterations: u32,
        score_history: &[f64],
    ) -> Transition {
        let score = validation.score;
        debug!(score, iteration_count, max_iterations, "next_state: called");

        if validation.status == ValidationStatus::Approved {
            return Transition::Accept(AcceptReason::Approved);
        }
        if score >= self.fast_path_score {
            return Transition::Accept(AcceptReason::FastPath);
        }

        if iteration_count >= max_iterations {
            return if score >= self.salvage_score {
                Transition::Accept(AcceptReason::Salvaged)
            } else {
                Transition::Escalate(EscalationReason::MaxIterationsExhausted)
            };
        }

        if let Some(&previous) = score_history.last()
            && score < previous - self.degradation_margin
        {
            debug!(previous, score, "next_state: quality degraded");
            return if score >= self.degradation_accept_score {
                Transition::Accept(AcceptReason::DegradationStop)
            } else {
                Transition::Escalate(EscalationReason::QualityDegraded)
            };
        }

        if score >= self.retry_floor {
            Transition::Retry
        } else {
            Transition::Escalate(EscalationReason::QualityTooLow)
        }
    }
}

/// `next_state` under the default thresholds
pub fn next_state(
    validation: &ValidationRecord,
    iteration_count: u32,
    max_iterations: u32,
    score_history: &[f64],
) -> Transition {
    TransitionPolicy::default().next_state(validation, iteration_count, max_iterations, score_history)
}
