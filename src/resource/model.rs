//! Resource snapshots
//!
//! Read-only records parsed from API list responses. Children refer to their
//! project by id only; the tree itself is owned by the inventory snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn timestamp_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = str_field(value, key)?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!("Invalid {} timestamp {:?}: {}", key, raw, e);
            None
        }
    }
}

fn roles_field(value: &Value) -> Vec<String> {
    let Some(roles) = value.get("roles").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    roles
        .iter()
        .filter_map(|role| {
            role.as_str()
                .or_else(|| role.get("roleName").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
        })
        .collect()
}

/// Anything with a creation timestamp
pub trait Dated {
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

/// Top-level tenant boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub org_id: String,
    pub created: Option<DateTime<Utc>>,
}

impl Project {
    /// Parse a project record; records without an id are rejected
    pub fn from_record(value: &Value, org_id: &str) -> Option<Self> {
        let id = str_field(value, "id")?;
        Some(Self {
            id: id.to_string(),
            name: str_field(value, "name").unwrap_or("Unknown").to_string(),
            org_id: str_field(value, "orgId").unwrap_or(org_id).to_string(),
            created: timestamp_field(value, "created"),
        })
    }
}

impl Dated for Project {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Creating,
    Idle,
    Deleting,
    Paused,
    Unknown,
}

impl ClusterState {
    pub fn from_record(value: &Value) -> Self {
        if value.get("paused").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Self::Paused;
        }
        match str_field(value, "stateName") {
            Some("CREATING") => Self::Creating,
            Some("IDLE") => Self::Idle,
            Some("DELETING") | Some("DELETED") => Self::Deleting,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub project_id: String,
    pub state: ClusterState,
}

impl Cluster {
    pub fn from_record(value: &Value, project_id: &str) -> Option<Self> {
        let name = str_field(value, "name")?;
        Some(Self {
            name: name.to_string(),
            project_id: project_id.to_string(),
            state: ClusterState::from_record(value),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UserKind {
    /// Organization account holding a project role
    Member,
    /// Database user authenticated against `database`
    Database { database: String },
}

/// A project membership or database user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Account id for members, username for database users
    pub id: String,
    pub username: String,
    pub project_id: String,
    pub kind: UserKind,
    pub roles: Vec<String>,
}

impl User {
    pub fn member_from_record(value: &Value, project_id: &str) -> Option<Self> {
        let id = str_field(value, "id")?;
        Some(Self {
            id: id.to_string(),
            username: str_field(value, "username").unwrap_or(id).to_string(),
            project_id: project_id.to_string(),
            kind: UserKind::Member,
            roles: roles_field(value),
        })
    }

    pub fn database_from_record(value: &Value, project_id: &str) -> Option<Self> {
        let username = str_field(value, "username")?;
        Some(Self {
            id: username.to_string(),
            username: username.to_string(),
            project_id: project_id.to_string(),
            kind: UserKind::Database {
                database: str_field(value, "databaseName").unwrap_or("admin").to_string(),
            },
            roles: roles_field(value),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum InvitationScope {
    Organization(String),
    Project(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invitation {
    /// Assigned by the API; absent for invitations not yet sent
    pub id: Option<String>,
    pub email: String,
    pub roles: Vec<String>,
    pub scope: InvitationScope,
}

impl Invitation {
    pub fn from_project_record(value: &Value, project_id: &str) -> Option<Self> {
        let email = str_field(value, "username").or_else(|| str_field(value, "emailAddress"))?;
        Some(Self {
            id: str_field(value, "id").map(|s| s.to_string()),
            email: email.to_string(),
            roles: roles_field(value),
            scope: InvitationScope::Project(project_id.to_string()),
        })
    }

    /// A new organization invitation, not yet sent
    pub fn to_organization(org_id: &str, email: &str, roles: &[String]) -> Self {
        Self {
            id: None,
            email: email.to_string(),
            roles: roles.to_vec(),
            scope: InvitationScope::Organization(org_id.to_string()),
        }
    }
}
