//! Working-tree infrastructure for the catalog gatekeeper.
//!
//! - [`YamlCatalogStore`]: catalog discovery and lossless YAML load/replace.
//! - [`FileApprovalMarker`]: the file the downstream merge step checks for.
//! - [`load_policy`]: reads the policy and allow-list documents.
//! - [`HttpReachabilityProbe`]: advisory `HEAD` checks of entry URLs.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Everything here implements a port from
//! [`pipeline::ports`] or feeds the composition root.

pub mod marker;
pub mod policy;
pub mod probe;
pub mod store;

pub use marker::FileApprovalMarker;
pub use policy::{load_policy, PolicyFiles};
pub use probe::{HttpReachabilityProbe, PROBE_TIMEOUT};
pub use store::YamlCatalogStore;
