//! Prompt loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults.

use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Override directory (`prompts.dir` in config)
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `dir` before the embedded templates
    pub fn new(dir: Option<PathBuf>) -> Self {
        debug!(?dir, "PromptLoader::new: called");
        let override_dir = dir.filter(|d| {
            let exists = d.is_dir();
            if !exists {
                debug!(dir = %d.display(), "PromptLoader::new: override directory missing, ignoring");
            }
            exists
        });

        Self {
            hbs: Self::engine(),
            override_dir,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in override directory");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_embedded_without_escaping() {
        let loader = PromptLoader::embedded_only();
        let ctx = serde_json::json!({
            "story_count": 1,
            "stories": "[{\"title\": \"As a user, I want <b>x</b> so that y\"}]",
            "project_context": "{}",
            "schema": "{}",
        });

        let rendered = loader.render("decompose-tasks", &ctx).unwrap();
        assert!(rendered.contains("these 1 user stories"));
        assert!(rendered.contains("<b>x</b>"));
        assert!(!rendered.contains("&lt;"));
    }

    #[test]
    fn test_override_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("decompose-tasks.pmt"), "custom {{story_count}}").unwrap();

        let loader = PromptLoader::new(Some(dir.path().to_path_buf()));
        let rendered = loader.render("decompose-tasks", &serde_json::json!({"story_count": 4})).unwrap();
        assert_eq!(rendered, "custom 4");

        // Templates missing from the override directory still come from the binary
        let rendered = loader
            .render("review-submission", &serde_json::json!({"task_id": "T001"}))
            .unwrap();
        assert!(rendered.contains("Task T001"));
    }

    #[test]
    fn test_missing_override_directory_is_ignored() {
        let loader = PromptLoader::new(Some(PathBuf::from("/nonexistent/prompts")));
        assert!(loader.render("validate-stories", &serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_unknown_template_errors() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render("nope", &serde_json::json!({})).is_err());
    }
}
