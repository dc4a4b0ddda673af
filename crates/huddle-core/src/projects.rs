use std::collections::HashSet;

use async_trait::async_trait;
use huddle_db::DbPool;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("project lookup failed: {0}")]
pub struct ProjectLookupError(pub String);

/// Confirms that a project exists, independent of who is connected to it.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn exists(&self, project_id: &str) -> Result<bool, ProjectLookupError>;
}

pub struct SqlProjectDirectory {
    db: DbPool,
}

impl SqlProjectDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProjectDirectory for SqlProjectDirectory {
    async fn exists(&self, project_id: &str) -> Result<bool, ProjectLookupError> {
        huddle_db::projects::project_exists(&self.db, project_id)
            .await
            .map_err(|e| ProjectLookupError(e.to_string()))
    }
}

/// Fixed set of known projects.
#[derive(Debug, Default, Clone)]
pub struct StaticProjectDirectory {
    projects: HashSet<String>,
}

impl StaticProjectDirectory {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            projects: ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ProjectDirectory for StaticProjectDirectory {
    async fn exists(&self, project_id: &str) -> Result<bool, ProjectLookupError> {
        Ok(self.projects.contains(project_id))
    }
}
