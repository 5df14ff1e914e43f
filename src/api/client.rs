//! API Client
//!
//! Main client for the management API, combining the transport with the
//! organization context and endpoint path helpers.

use super::http::{ApiRequest, ApiResponse, AttemptRecorder, NoopRecorder, Transport};
use super::pagination;
use crate::config::{Connection, Settings};
use crate::error::TransportError;
use futures::Stream;
use serde_json::Value;

/// Main API client
#[derive(Clone)]
pub struct ApiClient {
    pub transport: Transport,
    pub org_id: String,
    page_size: u32,
    max_pages: u32,
}

impl ApiClient {
    /// Create a new client from connection details and tunables
    pub fn new(connection: &Connection, settings: &Settings) -> Result<Self, TransportError> {
        let transport = Transport::new(
            &connection.base_url,
            connection.credentials.clone(),
            &settings.accept,
            settings.request_timeout(),
            settings.retry.clone(),
        )?;

        Ok(Self::from_parts(
            transport,
            &connection.org_id,
            settings.page_size,
            settings.max_pages,
        ))
    }

    pub fn from_parts(transport: Transport, org_id: &str, page_size: u32, max_pages: u32) -> Self {
        Self {
            transport,
            org_id: org_id.to_string(),
            page_size,
            max_pages,
        }
    }

    /// Send a single request, reporting attempts to `recorder`
    pub async fn send(
        &self,
        request: &ApiRequest,
        recorder: &dyn AttemptRecorder,
    ) -> Result<ApiResponse, TransportError> {
        self.transport.send(request, recorder).await
    }

    /// Lazily page through a list endpoint
    pub fn pages(&self, path: String) -> impl Stream<Item = Result<Vec<Value>, TransportError>> + '_ {
        pagination::pages(&self.transport, path, self.page_size, self.max_pages)
    }

    /// Check that the credentials can read the configured organization
    pub async fn verify_organization(&self) -> Result<Value, TransportError> {
        let request = ApiRequest::get(self.org_path(""));
        let response = self.send(&request, &NoopRecorder).await?;
        tracing::info!("Authenticated against organization {}", self.org_id);
        Ok(response.body)
    }

    // =========================================================================
    // Organization paths
    // =========================================================================

    /// Build an organization-scoped path
    pub fn org_path(&self, suffix: &str) -> String {
        format!("/orgs/{}{}", encode(&self.org_id), suffix)
    }

    pub fn projects_path(&self) -> String {
        self.org_path("/groups")
    }

    pub fn org_invites_path(&self) -> String {
        self.org_path("/invites")
    }

    // =========================================================================
    // Project paths
    // =========================================================================

    /// Build a project-scoped path
    pub fn project_path(&self, project_id: &str, suffix: &str) -> String {
        format!("/groups/{}{}", encode(project_id), suffix)
    }

    pub fn clusters_path(&self, project_id: &str) -> String {
        self.project_path(project_id, "/clusters")
    }

    pub fn cluster_path(&self, project_id: &str, cluster_name: &str) -> String {
        self.project_path(project_id, &format!("/clusters/{}", encode(cluster_name)))
    }

    pub fn members_path(&self, project_id: &str) -> String {
        self.project_path(project_id, "/users")
    }

    pub fn member_path(&self, project_id: &str, user_id: &str) -> String {
        self.project_path(project_id, &format!("/users/{}", encode(user_id)))
    }

    pub fn database_users_path(&self, project_id: &str) -> String {
        self.project_path(project_id, "/databaseUsers")
    }

    pub fn database_user_path(&self, project_id: &str, database: &str, username: &str) -> String {
        self.project_path(
            project_id,
            &format!("/databaseUsers/{}/{}", encode(database), encode(username)),
        )
    }

    pub fn project_invites_path(&self, project_id: &str) -> String {
        self.project_path(project_id, "/invites")
    }

    pub fn project_invite_path(&self, project_id: &str, invitation_id: &str) -> String {
        self.project_path(project_id, &format!("/invites/{}", encode(invitation_id)))
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Credentials;
    use crate::api::http::RetryPolicy;
    use std::time::Duration;
    use url::Url;

    fn client() -> ApiClient {
        let base = Url::parse("https://cloud.example.com/api/atlas/v2").unwrap();
        let transport = Transport::new(
            &base,
            Credentials::Token("t".into()),
            "application/json",
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
        .unwrap();
        ApiClient::from_parts(transport, "org-1", 500, 100)
    }

    #[test]
    fn test_paths() {
        let client = client();
        assert_eq!(client.projects_path(), "/orgs/org-1/groups");
        assert_eq!(client.org_invites_path(), "/orgs/org-1/invites");
        assert_eq!(client.clusters_path("p1"), "/groups/p1/clusters");
        assert_eq!(
            client.database_user_path("p1", "admin", "app user"),
            "/groups/p1/databaseUsers/admin/app%20user"
        );
        assert_eq!(
            client.transport.url(&client.cluster_path("p1", "c/1")),
            "https://cloud.example.com/api/atlas/v2/groups/p1/clusters/c%2F1"
        );
    }
}
