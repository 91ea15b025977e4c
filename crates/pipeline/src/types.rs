//! Shared value types for the gatekeeper domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. a [`Quality`] is one of three
//! values, an [`EntryLocation`] orders by file then position) and participate
//! in domain computations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RepoPath;

// ---------------------------------------------------------------------------
// Catalog entries
// ---------------------------------------------------------------------------

/// Editorial quality tier of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Unusually high quality.
    Exceptional,
    /// Reliable, established.
    Solid,
    /// Serves a specific audience.
    Niche,
}

impl Quality {
    /// All accepted values, in the order they are documented to contributors.
    pub const ALL: [Quality; 3] = [Quality::Exceptional, Quality::Solid, Quality::Niche];

    /// Returns the wire spelling of this tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Exceptional => "exceptional",
            Quality::Solid => "solid",
            Quality::Niche => "niche",
        }
    }

    /// Parses the wire spelling; `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == value)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language code → text, e.g. `{"en": "Example"}`.
pub type LocalizedText = BTreeMap<String, String>;

/// A structured catalog record, as persisted in a catalog file.
///
/// Instances are only ever produced by [`crate::schema::EntrySchema::validate`],
/// so holding a `CatalogEntry` means the record already passed the schema.
/// Field order here is the order entries are written back to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Lowercase slug identifier (e.g. `"example-com"`).
    pub id: String,
    /// Canonical site URL.
    pub url: String,
    /// One of the policy's allowed categories.
    pub category: String,
    /// Up to four lenses from the policy's allowed lenses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lenses: Vec<String>,
    /// Editorial tier, when assessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    /// Display title per language.
    pub title: LocalizedText,
    /// One-sentence description per language.
    pub description: LocalizedText,
}

/// Where an entry lives in the persisted catalog.
///
/// Orders by file path first, then by position within the file, which is the
/// stable order used for duplicate reports and adjudication requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryLocation {
    /// Catalog file, relative to the repository root.
    pub file: RepoPath,
    /// Zero-based position within the file.
    pub index: usize,
}

impl EntryLocation {
    /// Creates a location.
    pub fn new(file: RepoPath, index: usize) -> Self {
        Self { file, index }
    }
}

impl std::fmt::Display for EntryLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.file, self.index)
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Whether a [`Finding`] stops the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    /// Blocks the run; no external call or commit happens afterwards.
    Blocking,
    /// Reported to the contributor and the adjudicator, never blocks.
    Advisory,
}

/// What rule a [`Finding`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A changed file is outside the allow-list of the PR's shape.
    Scope,
    /// The submission file is not a single well-formed URL line.
    Format,
    /// A catalog entry does not conform to the entry schema.
    Schema,
    /// The URL failed the scheme, host or denylist checks.
    UrlRejected,
    /// The URL already occurs elsewhere in the catalog.
    DuplicateUrl,
    /// The reachability probe failed.
    Reachability,
    /// A catalog file could not be read or parsed.
    Catalog,
    /// Expanding a submission into a catalog entry failed.
    Generation,
    /// An accepted fix could not be written.
    Write,
}

/// A single validation result, collected and reported together with its
/// siblings so the contributor can fix everything in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// File the finding relates to; `None` when not file-specific.
    pub path: Option<RepoPath>,
    /// Human-readable location within the file (e.g. `"entry #2"`, `"line 3"`).
    pub location: Option<String>,
    /// Whether this finding blocks the run.
    pub severity: FindingSeverity,
    /// Rule that produced the finding.
    pub kind: FindingKind,
    /// Human-readable description.
    pub message: String,
}

impl Finding {
    /// Creates a blocking finding.
    pub fn blocking(kind: FindingKind, path: Option<RepoPath>, message: impl Into<String>) -> Self {
        Self {
            path,
            location: None,
            severity: FindingSeverity::Blocking,
            kind,
            message: message.into(),
        }
    }

    /// Creates an advisory finding.
    pub fn advisory(kind: FindingKind, path: Option<RepoPath>, message: impl Into<String>) -> Self {
        Self {
            path,
            location: None,
            severity: FindingSeverity::Advisory,
            kind,
            message: message.into(),
        }
    }

    /// Attaches a location within the file.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns `true` if this finding blocks the run.
    pub fn is_blocking(&self) -> bool {
        self.severity == FindingSeverity::Blocking
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.path, &self.location) {
            (Some(path), Some(loc)) => write!(f, "`{path}` {loc}: {}", self.message),
            (Some(path), None) => write!(f, "`{path}`: {}", self.message),
            (None, Some(loc)) => write!(f, "{loc}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
