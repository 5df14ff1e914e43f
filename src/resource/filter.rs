//! Filter predicates
//!
//! Pure functions over snapshot data. The inventory never applies these
//! itself; workflows decide which predicates select targets.

use super::inventory::ProjectSnapshot;
use super::model::Dated;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Age thresholds in days
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Thresholds {
    /// Projects older than this lose their members and database users
    pub user_days: u32,
    /// Projects older than this lose their pending invitations
    pub invitation_days: u32,
    /// Projects older than this lose their clusters
    pub cluster_days: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            user_days: 90,
            invitation_days: 90,
            cluster_days: 120,
        }
    }
}

/// A project is empty iff its cluster listing succeeded and found nothing.
///
/// A project whose clusters were not (or could not be) listed is never empty.
pub fn is_empty(project: &ProjectSnapshot) -> bool {
    matches!(&project.clusters, Some(clusters) if clusters.is_empty())
}

/// Strictly older than `threshold_days` at `now`. Undated resources never match.
pub fn older_than<T: Dated + ?Sized>(resource: &T, threshold_days: u32, now: DateTime<Utc>) -> bool {
    match resource.created_at() {
        Some(created) => now - created > Duration::days(i64::from(threshold_days)),
        None => false,
    }
}
