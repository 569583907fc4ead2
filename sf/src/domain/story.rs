//! User stories and story-id conventions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Priority;

/// Allowed story point values
pub const STORY_POINTS: [u32; 6] = [1, 2, 3, 5, 8, 13];

/// Acceptance criteria bounds per story
pub const MIN_ACCEPTANCE_CRITERIA: usize = 3;
pub const MAX_ACCEPTANCE_CRITERIA: usize = 7;

/// One backlog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// `US###`, assigned by renumbering
    pub id: String,
    /// "As a <persona>, I want <capability> so that <benefit>"
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub priority: Priority,
    pub estimated_points: u32,
    /// Ids of stories in the same batch
    pub dependencies: Vec<String>,
    pub technical_notes: String,
}

impl Story {
    /// Lowercased title + description + criteria, used by coverage heuristics
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.acceptance_criteria.join(" ")
        )
        .to_lowercase()
    }

    /// Does the title follow the persona/capability/benefit template
    pub fn has_valid_title(&self) -> bool {
        is_valid_title(&self.title)
    }

    /// Are the points one of the allowed values
    pub fn has_valid_points(&self) -> bool {
        STORY_POINTS.contains(&self.estimated_points)
    }
}

/// Check a title against "As a <persona>, I want <capability> so that <benefit>"
///
/// Case-insensitive; every slot must be non-empty.
pub fn is_valid_title(title: &str) -> bool {
    let lower = title.trim().to_lowercase();
    let Some(rest) = lower.strip_prefix("as an ").or_else(|| lower.strip_prefix("as a ")) else {
        return false;
    };
    let Some((persona, rest)) = rest.split_once(", i want ") else {
        return false;
    };
    let Some((capability, benefit)) = rest.split_once(" so that ") else {
        return false;
    };
    !persona.trim().is_empty() && !capability.trim().is_empty() && !benefit.trim().is_empty()
}

/// Format the n-th (1-based) story id
pub fn story_id(n: usize) -> String {
    format!("US{:03}", n)
}

/// Renumber stories to a contiguous `US001..USn` sequence
///
/// Dependencies naming a story's previous id are rewritten to its new id.
/// When several stories shared an id, the first one keeps the mapping.
/// References that match no previous id are left as they were.
pub fn renumber_stories(stories: &mut [Story]) {
    debug!(count = stories.len(), "renumber_stories: called");
    let mut id_map: HashMap<String, String> = HashMap::new();
    for (idx, story) in stories.iter().enumerate() {
        let old = story.id.trim();
        if !old.is_empty() {
            id_map.entry(old.to_string()).or_insert_with(|| story_id(idx + 1));
        }
    }

    for (idx, story) in stories.iter_mut().enumerate() {
        story.id = story_id(idx + 1);
        for dep in story.dependencies.iter_mut() {
            if let Some(new_id) = id_map.get(dep.trim()) {
                *dep = new_id.clone();
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::story;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_title_format() {
        assert!(is_valid_title("As a user, I want to log in so that I can see my data"));
        assert!(is_valid_title("as an admin, I want reports so that I can audit"));
        assert!(!is_valid_title("Login page"));
        assert!(!is_valid_title("As a user I want login"));
        assert!(!is_valid_title("As a , I want x so that y"));
        assert!(!is_valid_title("As a user, I want x so that "));
    }

    #[test]
    fn test_story_points() {
        let mut s = story("US001", &[]);
        assert!(s.has_valid_points());
        s.estimated_points = 4;
        assert!(!s.has_valid_points());
    }

    #[test]
    fn test_renumber_remaps_dependencies() {
        let mut stories = vec![story("S-a", &[]), story("S-b", &["S-a"]), story("S-c", &["S-b", "S-a"])];
        renumber_stories(&mut stories);

        let ids: Vec<_> = stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["US001", "US002", "US003"]);
        assert_eq!(stories[1].dependencies, vec!["US001"]);
        assert_eq!(stories[2].dependencies, vec!["US002", "US001"]);
    }

    #[test]
    fn test_renumber_handles_empty_and_duplicate_ids() {
        let mut stories = vec![story("", &[]), story("US007", &[]), story("US007", &["US007"]), story("", &[])];
        renumber_stories(&mut stories);

        let ids: Vec<_> = stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["US001", "US002", "US003", "US004"]);
        // First holder of the duplicate id wins
        assert_eq!(stories[2].dependencies, vec!["US002"]);
    }

    #[test]
    fn test_renumber_leaves_unknown_references() {
        let mut stories = vec![story("US001", &["US099"])];
        renumber_stories(&mut stories);
        assert_eq!(stories[0].dependencies, vec!["US099"]);
    }

    #[test]
    fn test_renumber_is_idempotent_on_contiguous_input() {
        let original = vec![story("US001", &[]), story("US002", &["US001"]), story("US003", &["US001", "US002"])];
        let mut once = original.clone();
        renumber_stories(&mut once);
        assert_eq!(once, original);

        let mut twice = once.clone();
        renumber_stories(&mut twice);
        assert_eq!(twice, once);
    }

    proptest! {
        #[test]
        fn prop_renumber_is_contiguous(raw_ids in proptest::collection::vec("(US[0-9]{3}|[a-z]{0,4}|)", 0..40)) {
            let mut stories: Vec<Story> = raw_ids.iter().map(|id| story(id, &[])).collect();
            renumber_stories(&mut stories);

            for (idx, s) in stories.iter().enumerate() {
                prop_assert_eq!(&s.id, &story_id(idx + 1));
            }

            let mut again = stories.clone();
            renumber_stories(&mut again);
            prop_assert_eq!(again, stories);
        }
    }
}
