//! Top-level error type for a gatekeeper run.
//!
//! [`GateError`] covers conditions that end a run in the `Fail` state.
//! Component-level errors (e.g. [`crate::ports::VcsError`] for git failures,
//! [`crate::adjudication::AdjudicationError`] for untrusted model output) are
//! defined in their respective modules and wrapped here.
//!
//! Nothing in this crate retries. A failure is surfaced once, in the report
//! comment, so a human sees every external-service hiccup.

use thiserror::Error;

use crate::adjudication::AdjudicationError;
use crate::ports::{MarkerError, StoreError, VcsError};
use crate::Finding;

/// Errors that halt a run.
///
/// Every variant maps to exit status `1` and a failure report.
#[derive(Debug, Error)]
pub enum GateError {
    /// The changed-file list could not be computed.
    ///
    /// File-scope enforcement depends on a clean list, so this is always fatal.
    #[error("Revision control failure: {0}")]
    Vcs(#[from] VcsError),

    /// The diff does not match any allowed PR shape, or touches files outside
    /// the shape's allow-list.
    ///
    /// `findings` enumerates every violation, not just the first.
    #[error("Pull request shape is invalid: {reason}")]
    InvalidShape {
        /// Why no shape matched.
        reason: String,
        /// Every scope and format violation found.
        findings: Vec<Finding>,
    },

    /// One or more blocking validation findings (format, schema, URL,
    /// duplicate) were collected before any external call was made.
    #[error("Validation failed with {} blocking finding(s)", findings.len())]
    Validation {
        /// All findings, blocking and advisory.
        findings: Vec<Finding>,
    },

    /// The catalog could not be loaded, so no duplicate index can be built.
    #[error("Catalog unavailable: {0}")]
    Catalog(#[from] StoreError),

    /// The adjudication service failed or returned an untrustworthy response.
    #[error("Adjudication failed: {0}")]
    Adjudication(#[from] AdjudicationError),

    /// The approval marker could not be updated; its state is unknown.
    #[error("Approval marker could not be updated: {0}")]
    Marker(#[from] MarkerError),

    /// The run configuration or a policy document is invalid.
    ///
    /// Produced at load time; the run never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl GateError {
    /// Findings carried by this error, if any.
    pub fn findings(&self) -> &[Finding] {
        match self {
            GateError::InvalidShape { findings, .. } | GateError::Validation { findings } => {
                findings
            }
            _ => &[],
        }
    }
}
