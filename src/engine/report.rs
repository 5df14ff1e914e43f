//! Outcome aggregation
//!
//! Workers hand every [`OperationResult`] to the [`Reporter`], which keeps
//! them append-only and tolerates any completion order. Summaries list
//! details in submission order.

use crate::resource::action::{Action, ActionTarget};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Dry-run: the action would have been applied
    DryRun,
    /// The resource no longer exists remotely
    AlreadyGone,
    /// The invitation already exists
    AlreadyExists,
    /// Not dispatched because the run was interrupted
    Cancelled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::AlreadyGone => "already-gone",
            Self::AlreadyExists => "already-exists",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
    Skipped(SkipReason),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Succeeded => None,
            Self::Failed(reason) => Some(reason.clone()),
            Self::Skipped(reason) => Some(reason.as_str().to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}({})", self.label(), reason),
            None => f.write_str(self.label()),
        }
    }
}

/// Final result for one target. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Submission index within the run
    pub seq: usize,
    pub target: String,
    pub kind: &'static str,
    pub action: Action,
    pub outcome: Outcome,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl OperationResult {
    pub fn new(seq: usize, target: &ActionTarget, outcome: Outcome, attempts: u32, elapsed: Duration) -> Self {
        Self {
            seq,
            target: target.id(),
            kind: target.resource().kind(),
            action: target.action(),
            outcome,
            attempts,
            elapsed,
        }
    }

    /// Failure for input rejected before any target could be built
    pub fn rejected(seq: usize, target: String, kind: &'static str, action: Action, reason: &str) -> Self {
        Self {
            seq,
            target,
            kind,
            action,
            outcome: Outcome::Failed(reason.to_string()),
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Serialized shape of one result
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Detail {
    pub target: String,
    pub kind: &'static str,
    pub action: Action,
    pub outcome: &'static str,
    pub reason: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl From<&OperationResult> for Detail {
    fn from(r: &OperationResult) -> Self {
        Self {
            target: r.target.clone(),
            kind: r.kind,
            action: r.action,
            outcome: r.outcome.label(),
            reason: r.outcome.reason(),
            attempts: r.attempts,
            elapsed_ms: u64::try_from(r.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<Detail>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Human-readable counts and failed targets
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} succeeded, {} failed, {} skipped ({} total)\n",
            self.succeeded,
            self.failed,
            self.skipped,
            self.total()
        );

        let dry_run: Vec<&Detail> = self
            .details
            .iter()
            .filter(|d| d.reason.as_deref() == Some(SkipReason::DryRun.as_str()))
            .collect();
        if !dry_run.is_empty() {
            out.push_str(&format!("Dry run: {} target(s) would be affected\n", dry_run.len()));
            for d in dry_run {
                out.push_str(&format!("  would {}: {}\n", d.action.display_name().to_lowercase(), d.target));
            }
        }

        let failed: Vec<&Detail> = self.details.iter().filter(|d| d.outcome == "failed").collect();
        if !failed.is_empty() {
            out.push_str("Failed:\n");
            for d in failed {
                out.push_str(&format!(
                    "  {} {}: {}\n",
                    d.action.display_name(),
                    d.target,
                    d.reason.as_deref().unwrap_or("unknown")
                ));
            }
        }
        out
    }
}

/// Append-only sink shared by all workers
#[derive(Debug, Default)]
pub struct Reporter {
    results: Mutex<Vec<OperationResult>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: OperationResult) {
        match self.results.lock() {
            Ok(mut results) => results.push(result),
            Err(poisoned) => poisoned.into_inner().push(result),
        }
    }

    pub fn len(&self) -> usize {
        self.results.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summarize(&self) -> Summary {
        let mut results = match self.results.lock() {
            Ok(results) => results.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        results.sort_by_key(|r| r.seq);

        let mut summary = Summary::default();
        for result in &results {
            match result.outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
            }
            summary.details.push(Detail::from(result));
        }
        summary
    }
}
