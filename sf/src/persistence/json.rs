//! One JSON document per project

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{PersistenceSink, ProjectMetadata, StorageError, StoredProject};
use crate::domain::{Story, Task};

/// Writes `<dir>/<project-id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", project_id))
    }

    /// Read a stored project back
    pub async fn load(path: impl AsRef<Path>) -> Result<StoredProject, StorageError> {
        debug!(path = %path.as_ref().display(), "JsonFileSink::load: called");
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn persist(&self, metadata: &ProjectMetadata, stories: &[Story], tasks: &[Task]) -> Result<String, StorageError> {
        debug!(id = %metadata.id, dir = %self.dir.display(), "JsonFileSink::persist: called");
        tokio::fs::create_dir_all(&self.dir).await?;

        let document = StoredProject {
            metadata: metadata.clone(),
            stories: stories.to_vec(),
            tasks: tasks.to_vec(),
        };
        let path = self.path_for(&metadata.id);
        tokio::fs::write(&path, serde_json::to_string_pretty(&document)?).await?;

        info!(path = %path.display(), stories = stories.len(), tasks = tasks.len(), "Stored project as JSON");
        Ok(metadata.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProjectContext;
    use crate::domain::story::fixtures::story;
    use crate::domain::task::fixtures::task;

    #[tokio::test]
    async fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("projects"));
        let metadata = ProjectMetadata::new(&ProjectContext::new(), 88.0, 1, "complete");
        let stories = vec![story("US001", &[])];
        let tasks = vec![task("T001", "US001", &[]), task("T002", "US001", &["T001"])];

        let id = sink.persist(&metadata, &stories, &tasks).await.unwrap();
        assert_eq!(id, metadata.id);

        let loaded = JsonFileSink::load(sink.path_for(&id)).await.unwrap();
        assert_eq!(loaded.metadata, metadata);
        assert_eq!(loaded.stories, stories);
        assert_eq!(loaded.task("T002").unwrap().dependencies, vec!["T001"]);
        assert!(loaded.story("US001").is_some());
    }

    #[tokio::test]
    async fn test_unwritable_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let sink = JsonFileSink::new(blocker.join("nested"));
        let metadata = ProjectMetadata::new(&ProjectContext::new(), 88.0, 1, "complete");
        let err = sink.persist(&metadata, &[], &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
