//! Development tasks decomposed from stories

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Priority;

/// Bounds for a single task estimate
pub const MIN_TASK_HOURS: u32 = 4;
pub const MAX_TASK_HOURS: u32 = 16;

/// Kind of work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TaskCategory {
    #[default]
    Backend,
    Frontend,
    Testing,
    Devops,
}

impl From<String> for TaskCategory {
    /// Unknown categories land in backend
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "frontend" | "front-end" | "ui" => Self::Frontend,
            "testing" | "test" | "qa" => Self::Testing,
            "devops" | "infrastructure" | "deployment" => Self::Devops,
            _ => Self::Backend,
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend => write!(f, "backend"),
            Self::Frontend => write!(f, "frontend"),
            Self::Testing => write!(f, "testing"),
            Self::Devops => write!(f, "devops"),
        }
    }
}

/// One unit of implementation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// `T###`, sequential within a run
    pub id: String,
    pub story_id: String,
    pub title: String,
    pub description: String,
    pub category: TaskCategory,
    /// Always within [MIN_TASK_HOURS, MAX_TASK_HOURS]
    pub estimated_hours: u32,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub technical_notes: String,
}

/// Clamp a raw estimate into the allowed range, rounding to whole hours
///
/// Non-finite input falls back to the lower bound.
pub fn clamp_hours(raw: f64) -> u32 {
    if !raw.is_finite() {
        return MIN_TASK_HOURS;
    }
    (raw.round().clamp(MIN_TASK_HOURS as f64, MAX_TASK_HOURS as f64)) as u32
}

/// Format the n-th (1-based) task id
pub fn task_id(n: usize) -> String {
    format!("T{:03}", n)
}

/// Renumber a concatenation of task groups to `T001..Tn`
///
/// Each group is one decomposition batch (or one fallback triplet) whose
/// dependencies refer to ids local to that group. References are remapped
/// within their own group; ones that match nothing there are dropped.
pub fn renumber_tasks(groups: Vec<Vec<Task>>) -> Vec<Task> {
    debug!(groups = groups.len(), "renumber_tasks: called");
    let mut next = 1;
    let mut out = Vec::new();

    for group in groups {
        let mut id_map: HashMap<String, String> = HashMap::new();
        let base = next;
        for (offset, task) in group.iter().enumerate() {
            let old = task.id.trim();
            if !old.is_empty() {
                id_map.entry(old.to_string()).or_insert_with(|| task_id(base + offset));
            }
        }

        for mut task in group {
            let new_id = task_id(next);
            task.dependencies = task
                .dependencies
                .iter()
                .filter_map(|dep| id_map.get(dep.trim()).cloned())
                .filter(|dep| *dep != new_id)
                .collect();
            task.id = new_id;
            out.push(task);
            next += 1;
        }
    }

    out
}
