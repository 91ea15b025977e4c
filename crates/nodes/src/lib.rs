//! atlasgate run orchestration.
//!
//! This crate provides the [`PipelineExecutor`] that drives one gatekeeper run
//! from diff inspection to the final report comment, and the [`RunReport`]
//! that records everything the run observed and decided.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The executor sequences calls between business
//! logic in the [`pipeline`] crate and the port traits (git, catalog store,
//! approval marker, comments, adjudicator, generator, probe). It contains no
//! domain rules of its own.

pub mod executor;
pub mod report;

pub use executor::{
    PipelineExecutor, Ports, RunOutcome, GENERATE_COMMIT_MESSAGE, NORMALIZE_COMMIT_MESSAGE,
};
pub use report::{RunReport, RunStatus};
