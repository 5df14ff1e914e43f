//! Cleanup workflows
//!
//! Each workflow takes an inventory snapshot, selects targets with pure
//! planner functions, passes the whole batch through the gate once and
//! executes it. The result is a [`RunReport`].

use crate::api::client::ApiClient;
use crate::config::Settings;
use crate::engine::{self, CancelSignal, Decision, Executor, Gate, Mode, OperationResult, Reporter, Summary, Throttle};
use crate::error::{ConfigError, EngineError};
use crate::resource::action::{Action, ActionTarget};
use crate::resource::filter::{self, Thresholds};
use crate::resource::inventory::{Inventory, ListingFailure, OrgSnapshot, Want};
use crate::resource::model::{ClusterState, Organization, Project, UserKind};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

pub const DEFAULT_INVITE_ROLE: &str = "ORG_GROUP_CREATOR";

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workflow {
    DeleteEmptyProjects,
    DeleteAllClusters,
    PauseAllClusters,
    CleanupAged,
    InviteUsers,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeleteEmptyProjects => "delete-empty-projects",
            Self::DeleteAllClusters => "delete-all-clusters",
            Self::PauseAllClusters => "pause-all-clusters",
            Self::CleanupAged => "cleanup-aged",
            Self::InviteUsers => "invite-users",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::DeleteEmptyProjects => "Delete empty projects",
            Self::DeleteAllClusters => "Delete all clusters",
            Self::PauseAllClusters => "Pause all clusters",
            Self::CleanupAged => "Clean up aged projects",
            Self::InviteUsers => "Invite users to organization",
        }
    }
}

/// Everything a workflow needs for one run
pub struct RunContext<'a> {
    pub client: &'a ApiClient,
    pub settings: &'a Settings,
    pub gate: Gate<'a>,
    pub cancel: CancelSignal,
}

/// Auditable record of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub action: Workflow,
    pub mode: Mode,
    /// Operator declined at the gate
    pub aborted: bool,
    /// Interrupted; targets not yet dispatched are `skipped(cancelled)`
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub listing_failures: Vec<ListingFailure>,
}

impl RunReport {
    /// 1 iff any target failed; aborted, dry-run and interrupted runs exit 0
    pub fn exit_code(&self) -> i32 {
        if self.summary.has_failures() {
            1
        } else {
            0
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("{} ({})\n", self.action.as_str(), self.mode.as_str());
        if self.aborted {
            out.push_str("Aborted: no action taken\n");
        } else {
            if self.interrupted {
                out.push_str("Interrupted: targets not yet dispatched were skipped\n");
            }
            out.push_str(&self.summary.render());
        }
        if !self.listing_failures.is_empty() {
            out.push_str(&format!(
                "{} listing failure(s); affected resources were not considered:\n",
                self.listing_failures.len()
            ));
            for f in &self.listing_failures {
                out.push_str(&format!("  {} {}: {}\n", f.project, f.resource, f.error));
            }
        }
        out
    }

    /// Write the report as pretty JSON into `dir`, returning the file path
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("report-{}.json", self.started_at.format("%Y%m%d-%H%M%S")));
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

// =============================================================================
// Planners
// =============================================================================

/// Delete every project whose cluster listing succeeded and came back empty
pub fn plan_empty_project_deletions(snapshot: &OrgSnapshot) -> Vec<ActionTarget> {
    snapshot
        .projects
        .iter()
        .filter(|p| filter::is_empty(p))
        .map(|p| ActionTarget::delete_project(p.project.clone()))
        .collect()
}

/// Delete every cluster not already being deleted
pub fn plan_cluster_deletions(snapshot: &OrgSnapshot) -> Vec<ActionTarget> {
    snapshot
        .projects
        .iter()
        .flat_map(|p| p.clusters.iter().flatten())
        .filter(|c| c.state != ClusterState::Deleting)
        .cloned()
        .map(ActionTarget::delete_cluster)
        .collect()
}

/// Pause every cluster that is neither paused nor being deleted
pub fn plan_cluster_pauses(snapshot: &OrgSnapshot) -> Vec<ActionTarget> {
    let clusters: Vec<_> = snapshot
        .projects
        .iter()
        .flat_map(|p| p.clusters.iter().flatten())
        .collect();

    let targets: Vec<ActionTarget> = clusters
        .iter()
        .filter(|c| !matches!(c.state, ClusterState::Paused | ClusterState::Deleting))
        .map(|c| ActionTarget::pause_cluster((*c).clone()))
        .collect();

    let passed = clusters.len() - targets.len();
    if passed > 0 {
        tracing::info!("{} clusters already paused or deleting", passed);
    }
    targets
}

/// Which collections to list for a project under the age policy
pub fn aged_want(project: &Project, thresholds: &Thresholds, now: DateTime<Utc>) -> Want {
    Want {
        clusters: filter::older_than(project, thresholds.cluster_days, now),
        users: filter::older_than(project, thresholds.user_days, now),
        invitations: filter::older_than(project, thresholds.invitation_days, now),
    }
}

/// Users, invitations and clusters of aged projects, measured on project age
pub fn plan_aged_cleanup(
    snapshot: &OrgSnapshot,
    thresholds: &Thresholds,
    protected_database_users: &[String],
    now: DateTime<Utc>,
) -> Vec<ActionTarget> {
    let mut targets = Vec::new();

    for p in &snapshot.projects {
        let want = aged_want(&p.project, thresholds, now);

        if want.users {
            for user in p.users.iter().flatten() {
                if let UserKind::Database { .. } = &user.kind {
                    if protected_database_users.iter().any(|name| name == &user.username) {
                        tracing::debug!("Keeping protected database user {}", user.username);
                        continue;
                    }
                }
                targets.push(ActionTarget::remove_user(user.clone()));
            }
        }

        if want.invitations {
            targets.extend(
                p.invitations
                    .iter()
                    .flatten()
                    .cloned()
                    .filter_map(ActionTarget::delete_invitation),
            );
        }

        if want.clusters {
            targets.extend(
                p.clusters
                    .iter()
                    .flatten()
                    .filter(|c| c.state != ClusterState::Deleting)
                    .cloned()
                    .map(ActionTarget::delete_cluster),
            );
        }
    }

    targets
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

/// Split emails into invitation targets and invalid addresses
pub fn plan_invitations(org_id: &str, emails: &[String], roles: &[String]) -> (Vec<ActionTarget>, Vec<String>) {
    let (valid, invalid): (Vec<&String>, Vec<&String>) = emails.iter().partition(|e| is_valid_email(e));
    let targets = valid
        .into_iter()
        .map(|email| ActionTarget::invite(org_id, email, roles))
        .collect();
    (targets, invalid.into_iter().cloned().collect())
}

/// Input turned away by a planner; reported as failed without a target
struct Rejected {
    target: String,
    kind: &'static str,
    action: Action,
    reason: &'static str,
}

impl Rejected {
    fn invalid_email(org_id: &str, email: &str) -> Self {
        Self {
            target: format!("{}/{}", org_id, email),
            kind: "invitation",
            action: Action::Invite,
            reason: "invalid-email",
        }
    }
}

/// Collect emails from the command line and an optional CSV file.
///
/// The file contributes the first column of each non-blank line. Duplicates
/// are dropped keeping the first occurrence.
pub fn load_emails(inline: &[String], file: Option<&Path>) -> Result<Vec<String>, ConfigError> {
    let mut raw: Vec<String> = inline.iter().map(|e| e.trim().to_string()).collect();

    if let Some(path) = file {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        raw.extend(
            content
                .lines()
                .filter_map(|line| line.split(',').next())
                .map(|cell| cell.trim().trim_matches('"').trim().to_string()),
        );
        tracing::info!("Loaded emails from {:?}", path);
    }

    let mut seen = HashSet::new();
    Ok(raw
        .into_iter()
        .filter(|e| !e.is_empty())
        .filter(|e| seen.insert(e.clone()))
        .collect())
}

// =============================================================================
// Runs
// =============================================================================

impl<'a> RunContext<'a> {
    async fn snapshot<F>(&self, want: F) -> Result<OrgSnapshot, EngineError>
    where
        F: Fn(&Project) -> Want,
    {
        Inventory::new(self.client, self.settings.concurrency)
            .with_cancel(self.cancel.clone())
            .snapshot(want)
            .await
            .map_err(EngineError::Listing)
    }

    /// Gate and execute `targets`; `rejected` input is recorded as failed after them
    async fn execute(
        &self,
        workflow: Workflow,
        started_at: DateTime<Utc>,
        snapshot: &OrgSnapshot,
        targets: Vec<ActionTarget>,
        rejected: Vec<Rejected>,
    ) -> RunReport {
        tracing::info!("{}: {} target(s) selected", workflow.as_str(), targets.len());

        let executor = Executor::new(self.client, self.settings.concurrency, self.cancel.clone());
        let throttle = Throttle::new(self.settings.rate_limit_cooldown());
        let reporter = Reporter::new();

        let offset = targets.len();
        let decision = engine::run_batch(&self.gate, &executor, &throttle, &reporter, workflow.title(), targets).await;
        let aborted = decision == Decision::Abort;

        if !aborted {
            for (i, r) in rejected.into_iter().enumerate() {
                tracing::error!("Rejected {}: {}", r.target, r.reason);
                reporter.record(OperationResult::rejected(offset + i, r.target, r.kind, r.action, r.reason));
            }
        }

        RunReport {
            run_id: Uuid::new_v4(),
            action: workflow,
            mode: self.gate.mode(),
            aborted,
            interrupted: self.cancel.is_cancelled(),
            started_at,
            finished_at: Utc::now(),
            summary: reporter.summarize(),
            listing_failures: snapshot.failures.iter().map(ListingFailure::from).collect(),
        }
    }

    pub async fn delete_empty_projects(&self) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let snapshot = self.snapshot(|_| Want::clusters()).await?;
        let targets = plan_empty_project_deletions(&snapshot);
        Ok(self.execute(Workflow::DeleteEmptyProjects, started_at, &snapshot, targets, Vec::new()).await)
    }

    pub async fn delete_all_clusters(&self) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let snapshot = self.snapshot(|_| Want::clusters()).await?;
        let targets = plan_cluster_deletions(&snapshot);
        Ok(self.execute(Workflow::DeleteAllClusters, started_at, &snapshot, targets, Vec::new()).await)
    }

    pub async fn pause_all_clusters(&self) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let snapshot = self.snapshot(|_| Want::clusters()).await?;
        let targets = plan_cluster_pauses(&snapshot);
        Ok(self.execute(Workflow::PauseAllClusters, started_at, &snapshot, targets, Vec::new()).await)
    }

    pub async fn cleanup_aged(&self) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let thresholds = self.settings.thresholds;
        let snapshot = self.snapshot(|p| aged_want(p, &thresholds, started_at)).await?;
        let targets = plan_aged_cleanup(
            &snapshot,
            &thresholds,
            &self.settings.protected_database_users,
            started_at,
        );
        Ok(self.execute(Workflow::CleanupAged, started_at, &snapshot, targets, Vec::new()).await)
    }

    pub async fn invite_users(&self, emails: &[String], roles: &[String]) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let org_id = &self.client.org_id;
        let (targets, invalid) = plan_invitations(org_id, emails, roles);
        let rejected = invalid
            .iter()
            .map(|email| Rejected::invalid_email(org_id, email))
            .collect();

        let snapshot = OrgSnapshot {
            organization: Organization { id: org_id.clone() },
            projects: Vec::new(),
            failures: Vec::new(),
        };
        Ok(self.execute(Workflow::InviteUsers, started_at, &snapshot, targets, rejected).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::inventory::ProjectSnapshot;
    use crate::resource::model::{Cluster, Invitation, User};
    use chrono::Duration as Days;

    fn project(id: &str, age_days: i64, now: DateTime<Utc>) -> Project {
        Project {
            id: id.into(),
            name: id.into(),
            org_id: "o".into(),
            created: Some(now - Days::days(age_days)),
        }
    }

    fn cluster(project_id: &str, name: &str, state: ClusterState) -> Cluster {
        Cluster {
            name: name.into(),
            project_id: project_id.into(),
            state,
        }
    }

    fn org(projects: Vec<ProjectSnapshot>) -> OrgSnapshot {
        OrgSnapshot {
            organization: Organization { id: "o".into() },
            projects,
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_pause_skips_paused_and_deleting() {
        let now = Utc::now();
        let mut p = ProjectSnapshot::new(project("p1", 1, now));
        p.clusters = Some(vec![
            cluster("p1", "idle", ClusterState::Idle),
            cluster("p1", "paused", ClusterState::Paused),
            cluster("p1", "going", ClusterState::Deleting),
            cluster("p1", "new", ClusterState::Creating),
        ]);
        let snapshot = org(vec![p]);

        let pauses: Vec<String> = plan_cluster_pauses(&snapshot).iter().map(|t| t.id()).collect();
        assert_eq!(pauses, vec!["p1/idle", "p1/new"]);

        let deletes: Vec<String> = plan_cluster_deletions(&snapshot).iter().map(|t| t.id()).collect();
        assert_eq!(deletes, vec!["p1/idle", "p1/paused", "p1/new"]);
    }

    #[test]
    fn test_aged_cleanup_thresholds_and_protection() {
        let now = Utc::now();
        let thresholds = Thresholds::default();

        // Old enough for users and invitations, not for clusters
        let mut mid = ProjectSnapshot::new(project("mid", 100, now));
        mid.users = Some(vec![
            User {
                id: "u1".into(),
                username: "a@example.com".into(),
                project_id: "mid".into(),
                kind: UserKind::Member,
                roles: vec![],
            },
            User {
                id: "admin".into(),
                username: "admin".into(),
                project_id: "mid".into(),
                kind: UserKind::Database { database: "admin".into() },
                roles: vec![],
            },
        ]);
        mid.invitations = Some(vec![Invitation {
            id: Some("i1".into()),
            email: "b@example.com".into(),
            roles: vec![],
            scope: crate::resource::model::InvitationScope::Project("mid".into()),
        }]);
        mid.clusters = Some(vec![cluster("mid", "c1", ClusterState::Idle)]);

        let mut old = ProjectSnapshot::new(project("old", 200, now));
        old.clusters = Some(vec![
            cluster("old", "c2", ClusterState::Idle),
            cluster("old", "c3", ClusterState::Deleting),
        ]);

        let young = ProjectSnapshot::new(project("young", 10, now));

        let targets = plan_aged_cleanup(&org(vec![mid, old, young]), &thresholds, &["admin".to_string()], now);
        let ids: Vec<String> = targets.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["mid/u1", "mid/i1", "old/c2"]);
    }

    #[test]
    fn test_aged_want_follows_project_age() {
        let now = Utc::now();
        let want = aged_want(&project("p", 100, now), &Thresholds::default(), now);
        assert_eq!(
            want,
            Want {
                clusters: false,
                users: true,
                invitations: true
            }
        );
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("first.last+tag@example.co.uk"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b.c"));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[test]
    fn test_plan_invitations_separates_invalid() {
        let emails = vec!["a@example.com".to_string(), "bogus".to_string()];
        let (targets, invalid) = plan_invitations("o", &emails, &[DEFAULT_INVITE_ROLE.to_string()]);
        assert_eq!(targets.len(), 1);
        assert_eq!(invalid, vec!["bogus"]);
    }

    #[test]
    fn test_load_emails_merges_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invitees.csv");
        std::fs::write(&path, "b@example.com,Bob\n\n\"c@example.com\",Carol\na@example.com\n").unwrap();

        let emails = load_emails(&["a@example.com".to_string(), " ".to_string()], Some(&path)).unwrap();
        assert_eq!(emails, vec!["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[test]
    fn test_report_exit_code_and_render() {
        let now = Utc::now();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            action: Workflow::DeleteEmptyProjects,
            mode: Mode::Interactive,
            aborted: true,
            interrupted: false,
            started_at: now,
            finished_at: now,
            summary: Summary::default(),
            listing_failures: vec![],
        };
        assert_eq!(report.exit_code(), 0);
        assert!(report.render().contains("Aborted: no action taken"));

        let dir = tempfile::tempdir().unwrap();
        let path = report.write_to(dir.path()).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["action"], "delete-empty-projects");
        assert_eq!(written["mode"], "interactive");
        assert_eq!(written["aborted"], true);
    }
}
