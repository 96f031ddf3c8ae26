use std::time::Instant;

use crate::client::LdClient;
use crate::errors::AppError;
use crate::models::project::Project;

/// Project listing fetched on first use and reused until the caller
/// invalidates it. Never refreshed implicitly.
#[derive(Default)]
pub struct ProjectCache {
    projects: Option<Vec<Project>>,
    fetched_at: Option<Instant>,
}

impl ProjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&mut self, client: &LdClient) -> Result<&[Project], AppError> {
        if self.projects.is_none() {
            tracing::info!("fetching project list");
            let projects = client.list_projects().await?;
            tracing::info!(count = projects.len(), "project list cached");
            self.projects = Some(projects);
            self.fetched_at = Some(Instant::now());
        } else {
            tracing::debug!("using cached project list");
        }
        Ok(self.projects.as_deref().unwrap_or_default())
    }

    pub fn is_populated(&self) -> bool {
        self.projects.is_some()
    }

    /// Drops the listing so the next `get` fetches it again.
    pub fn invalidate(&mut self) {
        tracing::info!("project list cache invalidated");
        self.projects = None;
        self.fetched_at = None;
    }

    /// Age of the cached listing, for display.
    pub fn age_secs(&self) -> Option<u64> {
        self.fetched_at.map(|t| t.elapsed().as_secs())
    }
}
