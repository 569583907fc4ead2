//! SQLite sink with project, story and task tables

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use super::{PersistenceSink, ProjectMetadata, StorageError};
use crate::domain::{Story, Task};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    validation_score REAL NOT NULL,
    iterations INTEGER NOT NULL,
    status TEXT NOT NULL,
    project_context TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_stories (
    project_id TEXT NOT NULL,
    story_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    acceptance_criteria TEXT NOT NULL,
    priority TEXT NOT NULL,
    estimated_points INTEGER NOT NULL,
    dependencies TEXT NOT NULL,
    technical_notes TEXT NOT NULL,
    PRIMARY KEY (project_id, story_id),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tasks (
    project_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    story_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    estimated_hours INTEGER NOT NULL,
    priority TEXT NOT NULL,
    dependencies TEXT NOT NULL,
    acceptance_criteria TEXT NOT NULL,
    technical_notes TEXT NOT NULL,
    PRIMARY KEY (project_id, task_id),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_story ON tasks(project_id, story_id);
"#;

/// Stores backlogs in one SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
}

impl SqliteSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(path: &Path) -> Result<Connection, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    fn write(path: &Path, metadata: &ProjectMetadata, stories: &[Story], tasks: &[Task]) -> Result<(), StorageError> {
        let mut conn = Self::open(path)?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO projects (id, name, validation_score, iterations, status, project_context, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metadata.id,
                metadata.name,
                metadata.validation_score,
                metadata.iterations,
                metadata.status,
                serde_json::to_string(&metadata.project_context)?,
                metadata.created_at.to_rfc3339(),
            ],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO user_stories (project_id, story_id, title, description, acceptance_criteria,
                     priority, estimated_points, dependencies, technical_notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for story in stories {
                insert.execute(params![
                    metadata.id,
                    story.id,
                    story.title,
                    story.description,
                    serde_json::to_string(&story.acceptance_criteria)?,
                    story.priority.to_string(),
                    story.estimated_points,
                    serde_json::to_string(&story.dependencies)?,
                    story.technical_notes,
                ])?;
            }
        }

        {
            let mut insert = tx.prepare(
                "INSERT INTO tasks (project_id, task_id, story_id, title, description, category,
                     estimated_hours, priority, dependencies, acceptance_criteria, technical_notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for task in tasks {
                insert.execute(params![
                    metadata.id,
                    task.id,
                    task.story_id,
                    task.title,
                    task.description,
                    task.category.to_string(),
                    task.estimated_hours,
                    task.priority.to_string(),
                    serde_json::to_string(&task.dependencies)?,
                    serde_json::to_string(&task.acceptance_criteria)?,
                    task.technical_notes,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    async fn persist(&self, metadata: &ProjectMetadata, stories: &[Story], tasks: &[Task]) -> Result<String, StorageError> {
        debug!(id = %metadata.id, path = %self.path.display(), "SqliteSink::persist: called");
        let path = self.path.clone();
        let metadata = metadata.clone();
        let stories = stories.to_vec();
        let tasks = tasks.to_vec();

        let id = tokio::task::spawn_blocking(move || {
            Self::write(&path, &metadata, &stories, &tasks).map(|_| metadata.id)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))??;

        info!(id = %id, path = %self.path.display(), "Stored project in SQLite");
        Ok(id)
    }
}
