//! Deterministic structural checks over a candidate backlog

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::domain::Story;

/// Issues found locally, without the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralReport {
    /// Issues attributable to one story
    pub story_issues: BTreeMap<String, Vec<String>>,
    /// Backlog-wide issues (coverage)
    pub global_issues: Vec<String>,
    /// Requirement areas with no matching story
    pub uncovered_terms: Vec<String>,
}

impl StructuralReport {
    pub fn issue_count(&self) -> usize {
        self.story_issues.values().map(Vec::len).sum::<usize>() + self.global_issues.len()
    }

    /// Every issue as a flat list, story issues prefixed with their id
    pub fn all_issues(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .story_issues
            .iter()
            .flat_map(|(id, issues)| issues.iter().map(move |i| format!("{}: {}", id, i)))
            .collect();
        all.extend(self.global_issues.iter().cloned());
        all
    }

    fn push(&mut self, story_id: &str, issue: String) {
        self.story_issues.entry(story_id.to_string()).or_default().push(issue);
    }
}

/// Run every structural check
pub fn check_stories(requirements: &str, stories: &[Story]) -> StructuralReport {
    debug!(count = stories.len(), "check_stories: called");
    let mut report = StructuralReport::default();

    for story in stories {
        for issue in check_story_fields(story) {
            report.push(&story.id, issue);
        }
    }

    check_dependencies(stories, &mut report);

    let coverage = check_coverage(requirements, stories);
    report.uncovered_terms = coverage.uncovered_terms;
    report.global_issues.extend(coverage.issues);

    debug!(issues = report.issue_count(), "check_stories: done");
    report
}

/// Title, required fields, criteria count, priority and points
pub fn check_story_fields(story: &Story) -> Vec<String> {
    let mut issues = Vec::new();

    if story.title.trim().is_empty() {
        issues.push("Missing story title".to_string());
    } else if !story.has_valid_title() {
        issues.push("Title doesn't follow 'As a... I want... so that...' format".to_string());
    }

    if story.id.trim().is_empty() {
        issues.push("Missing story ID".to_string());
    }

    if story.description.trim().is_empty() {
        issues.push("Missing description".to_string());
    }

    match story.acceptance_criteria.len() {
        0 => issues.push("Missing or empty acceptance criteria".to_string()),
        1 => issues.push("Insufficient acceptance criteria (need at least 2)".to_string()),
        _ => {}
    }

    if !story.priority.is_valid() {
        issues.push(format!("Invalid priority: {}", story.priority));
    }

    if !story.has_valid_points() {
        issues.push(format!("Invalid story points: {}", story.estimated_points));
    }

    issues
}

fn check_dependencies(stories: &[Story], report: &mut StructuralReport) {
    let ids: HashSet<&str> = stories.iter().map(|s| s.id.as_str()).collect();

    for story in stories {
        for dep in &story.dependencies {
            if dep == &story.id {
                report.push(&story.id, format!("Story {} cannot depend on itself", story.id));
            } else if !ids.contains(dep.as_str()) {
                report.push(&story.id, format!("Story {} has invalid dependency: {}", story.id, dep));
            }
        }
    }

    let graph = dependency_graph(stories);
    for story in stories {
        if let Some(cycle) = cycle_from(&graph, &story.id) {
            report.push(
                &story.id,
                format!("Story {} has circular dependencies: {}", story.id, cycle.join(" -> ")),
            );
        }
    }
}

/// Adjacency over ids present in the batch; dangling edges dropped
fn dependency_graph(stories: &[Story]) -> HashMap<&str, Vec<&str>> {
    let ids: HashSet<&str> = stories.iter().map(|s| s.id.as_str()).collect();
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for story in stories {
        let edges = graph.entry(story.id.as_str()).or_default();
        for dep in &story.dependencies {
            if ids.contains(dep.as_str()) {
                edges.push(dep.as_str());
            }
        }
    }
    graph
}

/// DFS from `root`; returns the walk up to the first node revisited on the
/// current path
///
/// The root is flagged whether it sits on the cycle or only reaches one.
/// Nodes fully explored are not entered again, keeping each root's walk O(V+E).
fn cycle_from<'a>(graph: &HashMap<&'a str, Vec<&'a str>>, root: &'a str) -> Option<Vec<String>> {
    fn visit<'a>(
        graph: &HashMap<&'a str, Vec<&'a str>>,
        node: &'a str,
        path: &mut Vec<&'a str>,
        on_path: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        path.push(node);
        on_path.insert(node);

        for &next in graph.get(node).map(Vec::as_slice).unwrap_or_default() {
            if on_path.contains(next) {
                let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            if done.contains(next) {
                continue;
            }
            if let Some(cycle) = visit(graph, next, path, on_path, done) {
                return Some(cycle);
            }
        }

        path.pop();
        on_path.remove(node);
        done.insert(node);
        None
    }

    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    let mut done = HashSet::new();
    visit(graph, root, &mut path, &mut on_path, &mut done)
}

/// A requirement area, the words that signal it, and the stems that cover it
struct CoverageTerm {
    term: &'static str,
    triggers: &'static [&'static str],
    evidence: &'static [&'static str],
}

const COVERAGE_TERMS: &[CoverageTerm] = &[
    CoverageTerm {
        term: "api",
        triggers: &["api", "apis", "endpoint", "endpoints", "graphql"],
        evidence: &["api", "endpoint", "graphql"],
    },
    CoverageTerm {
        term: "database",
        triggers: &["database", "databases", "db", "sql"],
        evidence: &["database", "data", "storage", "store", "persist", "sql"],
    },
    CoverageTerm {
        term: "authentication",
        triggers: &["authentication", "authenticate", "login", "log in", "sign in", "signin", "password"],
        evidence: &["authenticat", "login", "log in", "sign in", "signin", "password", "credential"],
    },
    CoverageTerm {
        term: "ui",
        triggers: &["ui", "user interface", "screen", "screens"],
        evidence: &["ui", "interface", "screen", "page", "view", "display"],
    },
    CoverageTerm {
        term: "frontend",
        triggers: &["frontend", "front-end", "front end"],
        evidence: &["frontend", "front-end", "front end", "interface", "screen", "page"],
    },
    CoverageTerm {
        term: "backend",
        triggers: &["backend", "back-end", "back end", "server"],
        evidence: &["backend", "back-end", "back end", "server", "service", "api"],
    },
    CoverageTerm {
        term: "security",
        triggers: &["secure", "security", "encryption", "encrypted", "privacy"],
        evidence: &["secur", "encrypt", "privacy", "authenticat", "authoriz"],
    },
    CoverageTerm {
        term: "performance",
        triggers: &["performance", "fast", "speed", "scalable", "scalability", "latency"],
        evidence: &["performance", "fast", "speed", "quick", "scal", "latency", "respon"],
    },
    CoverageTerm {
        term: "testing",
        triggers: &["testing", "tests", "tested", "qa"],
        evidence: &["test", "qa", "verif"],
    },
    CoverageTerm {
        term: "deployment",
        triggers: &["deployment", "deploy", "deployed", "ci/cd", "release"],
        evidence: &["deploy", "release", "ci/cd", "pipeline"],
    },
];

const CRUD_TRIGGERS: &[&str] = &["create", "read", "update", "delete", "crud"];
const CRUD_OPERATIONS: &[&str] = &["create", "read", "view", "update", "edit", "delete", "remove"];
const CRUD_MIN_COVERED: usize = 3;

/// Words and raw text of a lowercased document
struct Haystack {
    text: String,
    words: Vec<String>,
}

impl Haystack {
    fn new(text: &str) -> Self {
        let text = text.to_lowercase();
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { text, words }
    }

    /// Whole-word match, or substring for phrases
    fn has_word(&self, needle: &str) -> bool {
        if is_phrase(needle) {
            self.text.contains(needle)
        } else {
            self.words.iter().any(|w| w == needle)
        }
    }

    /// Word-prefix match, or substring for phrases
    fn has_stem(&self, stem: &str) -> bool {
        if is_phrase(stem) {
            self.text.contains(stem)
        } else {
            self.words.iter().any(|w| w.starts_with(stem))
        }
    }
}

fn is_phrase(needle: &str) -> bool {
    needle.contains(|c: char| !c.is_alphanumeric())
}

struct CoverageFindings {
    issues: Vec<String>,
    uncovered_terms: Vec<String>,
}

/// Keyword and CRUD coverage of the requirements by the backlog
fn check_coverage(requirements: &str, stories: &[Story]) -> CoverageFindings {
    let req = Haystack::new(requirements);
    let combined = stories.iter().map(Story::searchable_text).collect::<Vec<_>>().join(" ");
    let backlog = Haystack::new(&combined);

    let mut findings = CoverageFindings {
        issues: Vec::new(),
        uncovered_terms: Vec::new(),
    };

    for term in COVERAGE_TERMS {
        let asked = term.triggers.iter().any(|t| req.has_word(t));
        if asked && !term.evidence.iter().any(|e| backlog.has_stem(e)) {
            debug!(term = term.term, "check_coverage: requirement term not covered");
            findings
                .issues
                .push(format!("No story addresses '{}' mentioned in requirements", term.term));
            findings.uncovered_terms.push(term.term.to_string());
        }
    }

    if CRUD_TRIGGERS.iter().any(|t| req.has_word(t)) {
        let covered = CRUD_OPERATIONS.iter().filter(|op| backlog.has_stem(op)).count();
        if covered < CRUD_MIN_COVERED {
            findings.issues.push("CRUD operations not fully covered".to_string());
        }
    }

    findings
}
