//! Resource inventory
//!
//! Builds a read-only snapshot of the organization tree. Each collection is
//! fetched through the paginator; a failure listing one project's children is
//! recorded on the snapshot and never aborts sibling projects.

use super::model::{Cluster, Invitation, Organization, Project, User};
use crate::api::client::ApiClient;
use crate::engine::CancelSignal;
use crate::error::TransportError;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Which child collections to list for each project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Want {
    pub clusters: bool,
    pub users: bool,
    pub invitations: bool,
}

impl Want {
    pub fn clusters() -> Self {
        Self {
            clusters: true,
            ..Self::default()
        }
    }

    pub fn everything() -> Self {
        Self {
            clusters: true,
            users: true,
            invitations: true,
        }
    }
}

/// A project with whichever child collections were listed.
///
/// `None` means "not listed" (not wanted, or the listing failed); it is never
/// the same as an empty collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub clusters: Option<Vec<Cluster>>,
    pub users: Option<Vec<User>>,
    pub invitations: Option<Vec<Invitation>>,
}

impl ProjectSnapshot {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            clusters: None,
            users: None,
            invitations: None,
        }
    }
}

/// A child listing that failed for one project
#[derive(Debug, Clone, Error)]
#[error("failed to list {resource} of project {project_name} ({project_id}): {source}")]
pub struct PartialListingError {
    pub project_id: String,
    pub project_name: String,
    pub resource: &'static str,
    #[source]
    pub source: TransportError,
}

/// Serializable form of [`PartialListingError`] for reports
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListingFailure {
    pub project: String,
    pub resource: String,
    pub error: String,
}

impl From<&PartialListingError> for ListingFailure {
    fn from(e: &PartialListingError) -> Self {
        Self {
            project: e.project_id.clone(),
            resource: e.resource.to_string(),
            error: e.source.reason(),
        }
    }
}

/// Point-in-time view of an organization
#[derive(Debug, Clone)]
pub struct OrgSnapshot {
    pub organization: Organization,
    pub projects: Vec<ProjectSnapshot>,
    pub failures: Vec<PartialListingError>,
}

/// Lists organization resources through an [`ApiClient`]
pub struct Inventory<'a> {
    client: &'a ApiClient,
    concurrency: usize,
    cancel: CancelSignal,
}

impl<'a> Inventory<'a> {
    pub fn new(client: &'a ApiClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            cancel: CancelSignal::new(),
        }
    }

    /// Stop starting new project listings once `cancel` trips
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Collect every record of a paged collection, failing on the first error
    async fn collect(&self, path: String) -> Result<Vec<Value>, TransportError> {
        let pages: Vec<Vec<Value>> = self.client.pages(path).try_collect().await?;
        Ok(pages.into_iter().flatten().collect())
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, TransportError> {
        let records = self.collect(self.client.projects_path()).await?;
        let projects = parse_all("project", &records, |r| Project::from_record(r, &self.client.org_id))?;
        tracing::info!("Found {} projects in organization {}", projects.len(), self.client.org_id);
        Ok(projects)
    }

    pub async fn list_clusters_of(&self, project: &Project) -> Result<Vec<Cluster>, TransportError> {
        let records = self.collect(self.client.clusters_path(&project.id)).await?;
        parse_all("cluster", &records, |r| Cluster::from_record(r, &project.id))
    }

    /// Project members followed by database users
    pub async fn list_users_of(&self, project: &Project) -> Result<Vec<User>, TransportError> {
        let members = self.collect(self.client.members_path(&project.id)).await?;
        let database_users = self.collect(self.client.database_users_path(&project.id)).await?;

        let mut users = parse_all("member", &members, |r| User::member_from_record(r, &project.id))?;
        users.extend(parse_all("database user", &database_users, |r| {
            User::database_from_record(r, &project.id)
        })?);
        Ok(users)
    }

    pub async fn list_invitations_of(&self, project: &Project) -> Result<Vec<Invitation>, TransportError> {
        let records = self.collect(self.client.project_invites_path(&project.id)).await?;
        parse_all("invitation", &records, |r| Invitation::from_project_record(r, &project.id))
    }

    /// Snapshot every project, listing the children `want` asks for.
    ///
    /// Only a failure to list the projects themselves is an error; per-project
    /// failures end up in [`OrgSnapshot::failures`]. Project order follows the
    /// API's listing order.
    pub async fn snapshot<F>(&self, want: F) -> Result<OrgSnapshot, TransportError>
    where
        F: Fn(&Project) -> Want,
    {
        let projects = self.list_projects().await?;

        let results: Vec<(ProjectSnapshot, Vec<PartialListingError>)> = stream::iter(projects)
            .map(|project| {
                let want = want(&project);
                self.snapshot_project(project, want)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut snapshots = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (snapshot, errors) in results {
            snapshots.push(snapshot);
            failures.extend(errors);
        }

        if !failures.is_empty() {
            tracing::warn!("{} project listings failed; affected projects are excluded", failures.len());
        }
        if self.cancel.is_cancelled() {
            tracing::warn!("Listing interrupted; projects not yet listed are excluded");
        }

        Ok(OrgSnapshot {
            organization: Organization {
                id: self.client.org_id.clone(),
            },
            projects: snapshots,
            failures,
        })
    }

    async fn snapshot_project(
        &self,
        project: Project,
        want: Want,
    ) -> (ProjectSnapshot, Vec<PartialListingError>) {
        let mut errors = Vec::new();
        let mut snapshot = ProjectSnapshot::new(project.clone());

        if self.cancel.is_cancelled() {
            tracing::debug!("Not listing {} (cancelled)", project.id);
            return (snapshot, errors);
        }

        let failed = |resource: &'static str, source: TransportError| {
            tracing::warn!("Listing {} of {} failed: {}", resource, project.id, source);
            PartialListingError {
                project_id: project.id.clone(),
                project_name: project.name.clone(),
                resource,
                source,
            }
        };

        if want.clusters {
            match self.list_clusters_of(&project).await {
                Ok(clusters) => snapshot.clusters = Some(clusters),
                Err(e) => errors.push(failed("clusters", e)),
            }
        }
        if want.users {
            match self.list_users_of(&project).await {
                Ok(users) => snapshot.users = Some(users),
                Err(e) => errors.push(failed("users", e)),
            }
        }
        if want.invitations {
            match self.list_invitations_of(&project).await {
                Ok(invitations) => snapshot.invitations = Some(invitations),
                Err(e) => errors.push(failed("invitations", e)),
            }
        }

        (snapshot, errors)
    }
}

/// Parse every record of a listing; a single malformed record fails the whole listing
fn parse_all<T>(resource: &str, records: &[Value], parse: impl Fn(&Value) -> Option<T>) -> Result<Vec<T>, TransportError> {
    let parsed: Vec<T> = records.iter().filter_map(&parse).collect();
    let malformed = records.len() - parsed.len();
    if malformed > 0 {
        return Err(TransportError::Decode(format!(
            "{} of {} {} records malformed",
            malformed,
            records.len(),
            resource
        )));
    }
    Ok(parsed)
}
