//! Resource layer
//!
//! Everything the engine knows about the organization tree.
//!
//! # Architecture
//!
//! - [`model`] - Read-only snapshots of projects, clusters, users and invitations
//! - [`inventory`] - Lists the tree through the paginator, isolating per-project failures
//! - [`filter`] - Pure predicates (emptiness, age) over snapshots
//! - [`action`] - Actions bound to a single target, and the request each one issues

pub mod action;
pub mod filter;
pub mod inventory;
pub mod model;

pub use action::{Action, ActionTarget, TargetResource};
pub use inventory::{Inventory, OrgSnapshot, ProjectSnapshot, Want};
pub use model::{Cluster, ClusterState, Invitation, InvitationScope, Project, User, UserKind};
