//! Output sinks for finished backlogs
//!
//! The engine calls a sink once, after decomposition. A sink failure is
//! reported next to the successful result; it never discards it.

mod json;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::{ProjectContext, Story, Task};

pub use json::JsonFileSink;
pub use sqlite::SqliteSink;

/// Failure to store a finished backlog
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Join(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Descriptive data stored alongside a backlog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Time-ordered uuid, also the sink's project id
    pub id: String,
    pub name: String,
    pub validation_score: f64,
    pub iterations: u32,
    pub status: String,
    #[serde(default)]
    pub project_context: ProjectContext,
    pub created_at: DateTime<Utc>,
}

impl ProjectMetadata {
    /// Metadata under a fresh id; the name comes from the context's `title` or `name`
    pub fn new(project_context: &ProjectContext, validation_score: f64, iterations: u32, status: &str) -> Self {
        let id = uuid::Uuid::now_v7().to_string();
        let name = ["title", "name"]
            .iter()
            .filter_map(|key| project_context.get(*key))
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Project_{}", id));

        Self {
            id,
            name,
            validation_score,
            iterations,
            status: status.to_string(),
            project_context: project_context.clone(),
            created_at: Utc::now(),
        }
    }
}

/// A stored backlog as written by `JsonFileSink`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProject {
    pub metadata: ProjectMetadata,
    pub stories: Vec<Story>,
    pub tasks: Vec<Task>,
}

impl StoredProject {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn story(&self, story_id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == story_id)
    }
}

/// Destination for finished backlogs
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store the backlog and return its project id (`metadata.id`)
    async fn persist(&self, metadata: &ProjectMetadata, stories: &[Story], tasks: &[Task]) -> Result<String, StorageError>;
}

/// Build the sink selected in config; None when storage is disabled
pub fn create_sink(config: &StorageConfig) -> Option<Arc<dyn PersistenceSink>> {
    debug!(backend = ?config.backend, path = %config.path.display(), "create_sink: called");
    match config.backend {
        StorageBackend::None => None,
        StorageBackend::Json => Some(Arc::new(JsonFileSink::new(&config.path))),
        StorageBackend::Sqlite => Some(Arc::new(SqliteSink::new(config.path.join("storyforge.db")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_name_from_context() {
        let mut context = ProjectContext::new();
        context.insert("name".to_string(), json!("Inventory"));
        let meta = ProjectMetadata::new(&context, 82.0, 2, "complete");
        assert_eq!(meta.name, "Inventory");

        context.insert("title".to_string(), json!("Warehouse portal"));
        let meta = ProjectMetadata::new(&context, 82.0, 2, "complete");
        assert_eq!(meta.name, "Warehouse portal");
    }

    #[test]
    fn test_metadata_name_fallback() {
        let mut context = ProjectContext::new();
        context.insert("title".to_string(), json!("  "));
        let meta = ProjectMetadata::new(&context, 70.0, 1, "complete");
        assert_eq!(meta.name, format!("Project_{}", meta.id));
    }

    #[test]
    fn test_create_sink_by_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig {
            backend: StorageBackend::None,
            path: dir.path().to_path_buf(),
        };
        assert!(create_sink(&config).is_none());
        config.backend = StorageBackend::Json;
        assert!(create_sink(&config).is_some());
        config.backend = StorageBackend::Sqlite;
        assert!(create_sink(&config).is_some());
    }

    #[test]
    fn test_project_ids_unique() {
        let context = ProjectContext::new();
        let a = ProjectMetadata::new(&context, 0.0, 1, "complete");
        let b = ProjectMetadata::new(&context, 0.0, 1, "complete");
        assert_ne!(a.id, b.id);
    }
}
