//! Management API interaction module
//!
//! Core functionality for talking to the remote management API:
//! authentication, the retrying HTTP transport, pagination, and the
//! organization-scoped client.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer token or service account credentials
//! - [`http`] - Transport with status classification, retry and backoff
//! - [`pagination`] - Lazy page streams over list endpoints
//! - [`client`] - Organization-scoped client and endpoint paths
//!
//! # Example
//!
//! ```ignore
//! use atlas_sweep::api::client::ApiClient;
//!
//! async fn example(client: &ApiClient) -> anyhow::Result<()> {
//!     client.verify_organization().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod pagination;
