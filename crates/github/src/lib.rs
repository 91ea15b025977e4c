//! GitHub-side infrastructure for the catalog gatekeeper.
//!
//! Two adapters live here:
//!
//! - [`GitCli`] implements [`pipeline::ports::VersionControl`] by shelling out
//!   to `git` in the CI checkout.
//! - [`GitHubClient`] implements [`pipeline::ports::CommentSink`] against the
//!   REST API.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** No catalog rules live here; the [`pipeline`] crate
//! never sees a process handle or an HTTP status.

pub mod comments;
pub mod git;

pub use comments::{GitHubClient, GitHubClientError, DEFAULT_API_BASE};
pub use git::GitCli;
