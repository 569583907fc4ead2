//! Deterministic tasks for stories the model could not decompose

use crate::domain::{Story, Task, TaskCategory};

const BACKEND_HOURS: u32 = 12;
const FRONTEND_HOURS: u32 = 10;
const TESTING_HOURS: u32 = 6;

/// Backend, frontend and testing tasks for one story
///
/// Ids are local to the returned group (`T001..T003`); the frontend task
/// depends on the backend one and testing depends on both.
pub fn fallback_tasks(story: &Story) -> Vec<Task> {
    let subject = capability(&story.title);
    let make = |local: &str, title: String, category: TaskCategory, hours: u32, deps: &[&str], criterion: String| Task {
        id: local.to_string(),
        story_id: story.id.clone(),
        title,
        description: format!("{} work for story {}: {}", category, story.id, story.title),
        category,
        estimated_hours: hours,
        priority: story.priority.clone(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        acceptance_criteria: vec![criterion],
        technical_notes: String::new(),
    };

    vec![
        make(
            "T001",
            format!("Implement backend for {}", subject),
            TaskCategory::Backend,
            BACKEND_HOURS,
            &[],
            "Server-side logic and data access are implemented".to_string(),
        ),
        make(
            "T002",
            format!("Build user interface for {}", subject),
            TaskCategory::Frontend,
            FRONTEND_HOURS,
            &["T001"],
            "User interface is wired to the backend".to_string(),
        ),
        make(
            "T003",
            format!("Test {}", subject),
            TaskCategory::Testing,
            TESTING_HOURS,
            &["T001", "T002"],
            format!("Acceptance criteria of {} are covered by tests", story.id),
        ),
    ]
}

/// The capability clause of a persona/capability/benefit title
fn capability(title: &str) -> String {
    let mut rest = title.trim();
    for prefix in ["As an ", "As a "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    if let Some(idx) = rest.find(", I want ") {
        rest = &rest[idx + ", I want ".len()..];
    }
    if let Some(idx) = rest.find(" so that ") {
        rest = &rest[..idx];
    }

    let rest = rest.trim().trim_end_matches('.');
    if rest.is_empty() { title.trim().to_string() } else { rest.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::story::fixtures::story;

    #[test]
    fn test_triplet_shape() {
        let tasks = fallback_tasks(&story("US004", &[]));

        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.story_id == "US004"));
        assert_eq!(
            tasks.iter().map(|t| t.category).collect::<Vec<_>>(),
            vec![TaskCategory::Backend, TaskCategory::Frontend, TaskCategory::Testing]
        );
        assert_eq!(
            tasks.iter().map(|t| t.estimated_hours).collect::<Vec<_>>(),
            vec![12, 10, 6]
        );
        assert!(tasks[0].dependencies.is_empty());
        assert_eq!(tasks[1].dependencies, vec!["T001"]);
        assert_eq!(tasks[2].dependencies, vec!["T001", "T002"]);
    }

    #[test]
    fn test_capability_from_title() {
        assert_eq!(
            capability("As a shopper, I want to save my cart so that I can buy later"),
            "to save my cart"
        );
        assert_eq!(capability("As an admin, I want audit logs"), "audit logs");
        assert_eq!(capability("Export reports."), "Export reports");

        let tasks = fallback_tasks(&story("US001", &[]));
        assert_eq!(tasks[0].title, "Implement backend for feature US001");
        assert_eq!(tasks[2].title, "Test feature US001");
    }
}
