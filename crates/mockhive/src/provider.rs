//! Definition provider: the external persistence collaborator's interface.
//!
//! Given a tenant lookup key the provider returns the full project graph
//! (endpoints, responses, rules, webhooks) as a read-only snapshot. The
//! engine never writes through this interface; CRUD lives elsewhere.

use crate::model::Project;
use async_trait::async_trait;
use parking_lot::RwLock;

#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    /// Team-scoped lookup: `/{team}/{project}/...` on the shared listener.
    async fn by_slugs(&self, team_slug: &str, project_slug: &str) -> Option<Project>;

    /// Personal-project lookup: `/{project}/...` on the shared listener.
    async fn by_personal_slug(&self, slug: &str) -> Option<Project>;
}

/// Registry-backed provider used by the standalone binary (populated from
/// the config file) and by tests.
#[derive(Default)]
pub struct InMemoryProvider {
    projects: RwLock<Vec<Project>>,
}

impl InMemoryProvider {
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects: RwLock::new(projects),
        }
    }

    /// Insert or replace a project by id.
    pub fn upsert(&self, project: Project) {
        let mut projects = self.projects.write();
        if let Some(existing) = projects.iter_mut().find(|p| p.id == project.id) {
            *existing = project;
        } else {
            projects.push(project);
        }
    }

    pub fn remove(&self, project_id: &str) -> Option<Project> {
        let mut projects = self.projects.write();
        let idx = projects.iter().position(|p| p.id == project_id)?;
        Some(projects.remove(idx))
    }

    pub fn all(&self) -> Vec<Project> {
        self.projects.read().clone()
    }
}

#[async_trait]
impl DefinitionProvider for InMemoryProvider {
    async fn by_slugs(&self, team_slug: &str, project_slug: &str) -> Option<Project> {
        self.projects
            .read()
            .iter()
            .find(|p| p.team_slug.as_deref() == Some(team_slug) && p.slug == project_slug)
            .cloned()
    }

    async fn by_personal_slug(&self, slug: &str) -> Option<Project> {
        self.projects
            .read()
            .iter()
            .find(|p| p.team_slug.is_none() && p.slug == slug)
            .cloned()
    }
}
