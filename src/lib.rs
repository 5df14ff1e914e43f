//! Bulk lifecycle operations for an organization's cloud database projects.
//!
//! Lists the organization tree, selects targets with pure filters, gates the
//! batch behind dry-run or confirmation, executes it with bounded concurrency
//! and reports every outcome.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod resource;
pub mod workflow;

/// Version injected at compile time via ATLAS_SWEEP_VERSION (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("ATLAS_SWEEP_VERSION") {
    Some(v) => v,
    None => "dev",
};
