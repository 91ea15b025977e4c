//! Core gatekeeping domain for atlasgate.
//!
//! This crate contains every domain concept used to gate a catalog pull
//! request: identifiers, value types, the URL and entry validators, the shape
//! decision table, the duplicate index, the adjudication request/response
//! contract and outcome planning. Infrastructure crates implement the port
//! traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepoPath`, `GitRef`, `PullRequestId`, etc.) |
//! | [`types`] | Shared value types (`CatalogEntry`, `EntryLocation`, `Finding`, etc.) |
//! | [`errors`] | [`GateError`], the errors that end a run in `Fail` |
//! | [`urls`] | URL normalization, acceptability and slugs |
//! | [`submission`] | Single-URL submission file format |
//! | [`schema`] | Structured-entry schema |
//! | [`changes`] | The diff as added/modified/deleted path sets |
//! | [`context`] | The immutable per-run context |
//! | [`shape`] | PR shape classification and file-scope enforcement |
//! | [`index`] | Global URL-uniqueness index |
//! | [`policy`] | Policy documents and allow-lists |
//! | [`generation`] | Submission expansion request and acceptance |
//! | [`adjudication`] | Adjudication request and untrusted response parsing |
//! | [`outcome`] | Verdict and autofix planning |
//! | [`ports`] | Capability traits implemented by infrastructure crates |

pub mod adjudication;
pub mod changes;
pub mod context;
pub mod errors;
#[cfg(any(test, feature = "test-support"))]
pub mod fakes;
pub mod generation;
pub mod identifiers;
pub mod index;
pub mod outcome;
pub mod policy;
pub mod ports;
pub mod schema;
pub mod shape;
pub mod submission;
pub mod types;
pub mod urls;

// Re-export the vocabulary at the crate root for downstream crates.
pub use changes::ChangeSet;
pub use errors::GateError;
pub use identifiers::{
    ActorLogin, CommitSha, GitRef, PipelineRunId, PullRequestId, RepoPath, RepositoryId,
};
pub use types::{
    CatalogEntry, EntryLocation, Finding, FindingKind, FindingSeverity, LocalizedText, Quality,
    Timestamp,
};
