//! Actions and their targets
//!
//! An [`ActionTarget`] pairs a resource snapshot with the action to apply to
//! it. Targets are only built through the typed constructors, so an action
//! can never be paired with a resource of the wrong kind.

use super::model::{Cluster, Invitation, InvitationScope, Project, User, UserKind};
use crate::api::client::ApiClient;
use crate::api::http::ApiRequest;
use serde::Serialize;
use serde_json::json;

/// Operation applied to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    DeleteProject,
    DeleteCluster,
    PauseCluster,
    RemoveUser,
    DeleteInvitation,
    Invite,
}

impl Action {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DeleteProject => "Delete project",
            Self::DeleteCluster => "Delete cluster",
            Self::PauseCluster => "Pause cluster",
            Self::RemoveUser => "Remove user",
            Self::DeleteInvitation => "Delete invitation",
            Self::Invite => "Invite user",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::DeleteProject | Self::DeleteCluster | Self::DeleteInvitation => "Deleted",
            Self::PauseCluster => "Paused",
            Self::RemoveUser => "Removed",
            Self::Invite => "Invited",
        }
    }

    /// Destructive actions cannot be undone by re-running
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Self::PauseCluster | Self::Invite)
    }
}

/// The resource an action applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetResource {
    Project(Project),
    Cluster(Cluster),
    User(User),
    Invitation(Invitation),
}

impl TargetResource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Cluster(_) => "cluster",
            Self::User(_) => "user",
            Self::Invitation(_) => "invitation",
        }
    }

    /// Stable identifier used in reports
    pub fn id(&self) -> String {
        match self {
            Self::Project(p) => p.id.clone(),
            Self::Cluster(c) => format!("{}/{}", c.project_id, c.name),
            Self::User(u) => match &u.kind {
                UserKind::Member => format!("{}/{}", u.project_id, u.id),
                UserKind::Database { database } => format!("{}/{}/{}", u.project_id, database, u.id),
            },
            Self::Invitation(i) => {
                let scope = match &i.scope {
                    InvitationScope::Organization(id) | InvitationScope::Project(id) => id,
                };
                format!("{}/{}", scope, i.id.as_deref().unwrap_or(&i.email))
            }
        }
    }

    /// Human-readable name for prompts and logs
    pub fn label(&self) -> String {
        match self {
            Self::Project(p) => format!("project '{}' ({})", p.name, p.id),
            Self::Cluster(c) => format!("cluster '{}' in {}", c.name, c.project_id),
            Self::User(u) => match &u.kind {
                UserKind::Member => format!("user '{}' in {}", u.username, u.project_id),
                UserKind::Database { database } => {
                    format!("database user '{}@{}' in {}", u.username, database, u.project_id)
                }
            },
            Self::Invitation(i) => format!("invitation for '{}'", i.email),
        }
    }
}

/// An action bound to one resource; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    action: Action,
    resource: TargetResource,
}

impl ActionTarget {
    pub fn delete_project(project: Project) -> Self {
        Self {
            action: Action::DeleteProject,
            resource: TargetResource::Project(project),
        }
    }

    pub fn delete_cluster(cluster: Cluster) -> Self {
        Self {
            action: Action::DeleteCluster,
            resource: TargetResource::Cluster(cluster),
        }
    }

    pub fn pause_cluster(cluster: Cluster) -> Self {
        Self {
            action: Action::PauseCluster,
            resource: TargetResource::Cluster(cluster),
        }
    }

    pub fn remove_user(user: User) -> Self {
        Self {
            action: Action::RemoveUser,
            resource: TargetResource::User(user),
        }
    }

    /// Delete a pending project invitation; `None` unless it is a project
    /// invitation with an id to address
    pub fn delete_invitation(invitation: Invitation) -> Option<Self> {
        if invitation.id.is_none() || !matches!(invitation.scope, InvitationScope::Project(_)) {
            return None;
        }
        Some(Self {
            action: Action::DeleteInvitation,
            resource: TargetResource::Invitation(invitation),
        })
    }

    /// Invite `email` to the organization with `roles`
    pub fn invite(org_id: &str, email: &str, roles: &[String]) -> Self {
        Self {
            action: Action::Invite,
            resource: TargetResource::Invitation(Invitation::to_organization(org_id, email, roles)),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn resource(&self) -> &TargetResource {
        &self.resource
    }

    pub fn id(&self) -> String {
        self.resource.id()
    }

    /// The mutating request that applies this action
    pub fn request(&self, client: &ApiClient) -> ApiRequest {
        match (&self.action, &self.resource) {
            (Action::DeleteProject, TargetResource::Project(p)) => {
                ApiRequest::delete(client.project_path(&p.id, ""))
            }
            (Action::DeleteCluster, TargetResource::Cluster(c)) => {
                ApiRequest::delete(client.cluster_path(&c.project_id, &c.name))
            }
            (Action::PauseCluster, TargetResource::Cluster(c)) => ApiRequest::patch(
                client.cluster_path(&c.project_id, &c.name),
                json!({ "paused": true }),
            ),
            (Action::RemoveUser, TargetResource::User(u)) => match &u.kind {
                UserKind::Member => ApiRequest::delete(client.member_path(&u.project_id, &u.id)),
                UserKind::Database { database } => {
                    ApiRequest::delete(client.database_user_path(&u.project_id, database, &u.username))
                }
            },
            (
                Action::DeleteInvitation,
                TargetResource::Invitation(Invitation {
                    id: Some(id),
                    scope: InvitationScope::Project(project_id),
                    ..
                }),
            ) => ApiRequest::delete(client.project_invite_path(project_id, id)),
            (Action::Invite, TargetResource::Invitation(i)) => ApiRequest::post(
                client.org_invites_path(),
                json!({ "username": i.email, "roles": i.roles }),
            ),
            // Constructors only pair actions with matching resources
            (action, resource) => unreachable!("{:?} cannot target a {}", action, resource.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Credentials;
    use crate::api::http::{RetryPolicy, Transport};
    use crate::resource::model::ClusterState;
    use reqwest::Method;
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

    fn cluster() -> Cluster {
        Cluster {
            name: "c1".into(),
            project_id: "p1".into(),
            state: ClusterState::Idle,
        }
    }

    #[test]
    fn test_pause_is_a_patch() {
        let req = ActionTarget::pause_cluster(cluster()).request(&client());
        assert_eq!(req.method, Method::PATCH);
        assert_eq!(req.path, "/groups/p1/clusters/c1");
        assert_eq!(req.body, Some(json!({"paused": true})));
    }

    #[test]
    fn test_database_user_removal_path() {
        let user = User {
            id: "app".into(),
            username: "app".into(),
            project_id: "p1".into(),
            kind: UserKind::Database { database: "admin".into() },
            roles: vec![],
        };
        let target = ActionTarget::remove_user(user);
        assert_eq!(target.id(), "p1/admin/app");
        let req = target.request(&client());
        assert_eq!(req.method, Method::DELETE);
        assert_eq!(req.path, "/groups/p1/databaseUsers/admin/app");
    }

    #[test]
    fn test_invite_posts_to_org() {
        let target = ActionTarget::invite("org-1", "a@example.com", &["ORG_MEMBER".to_string()]);
        assert_eq!(target.id(), "org-1/a@example.com");
        let req = target.request(&client());
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/orgs/org-1/invites");
        assert_eq!(req.body, Some(json!({"username": "a@example.com", "roles": ["ORG_MEMBER"]})));
    }

    #[test]
    fn test_only_addressable_project_invitations_are_deleted() {
        let pending = |id: Option<&str>, scope: InvitationScope| Invitation {
            id: id.map(str::to_string),
            email: "a@example.com".into(),
            roles: vec![],
            scope,
        };

        assert!(ActionTarget::delete_invitation(pending(None, InvitationScope::Project("p1".into()))).is_none());
        assert!(ActionTarget::delete_invitation(pending(Some("i1"), InvitationScope::Organization("org-1".into()))).is_none());

        let target = ActionTarget::delete_invitation(pending(Some("i1"), InvitationScope::Project("p1".into())))
            .expect("project invitation with an id");
        assert_eq!(target.id(), "p1/i1");
        let req = target.request(&client());
        assert_eq!(req.method, Method::DELETE);
        assert_eq!(req.path, "/groups/p1/invites/i1");
    }

    #[test]
    fn test_action_vocabulary() {
        assert!(Action::DeleteCluster.is_destructive());
        assert!(!Action::PauseCluster.is_destructive());
        assert_eq!(Action::PauseCluster.past_tense(), "Paused");
        assert_eq!(serde_json::to_value(Action::DeleteProject).unwrap(), json!("delete-project"));
    }
}
