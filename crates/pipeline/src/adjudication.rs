//! The adjudication request and the untrusted response it produces.
//!
//! The request is wholly deterministic: entries are sorted by location, URL
//! checks are keyed by normalized URL in a sorted map, and only
//! schema-validated entry fields are embedded, which bounds the
//! prompt-injection surface to data that already passed validation.
//!
//! The response is model output. [`parse_response`] either returns a fully
//! consistent [`AdjudicationResponse`] or an [`AdjudicationError`]; nothing is
//! ever partially trusted. Accepted `proposed_entry` values are still
//! re-validated by [`crate::outcome`] before anything is written.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::policy::PolicyBundle;
use crate::ports::{ProbeOutcome, ServiceError};
use crate::urls::normalize;
use crate::{CatalogEntry, EntryLocation, Quality, RepoPath};

/// What the adjudicator is asked to do.
pub const TASK: &str = "Decide accept/reject per entry; if accept, propose normalized fields and corrected categorization.";

/// Policy rules embedded verbatim so the adjudicator's discretion is bounded.
pub const HARD_RULES: [&str; 5] = [
    "Reject scams, malware, phishing, NSFW, illegal content, hate/harassment.",
    "Reject obvious SEO/affiliate spam or low-effort clones.",
    "If category is not allowed, propose the closest allowed category.",
    "Only use lenses from allowed_lenses; propose at most 4 lenses.",
    "Description max 160 chars; one sentence; no marketing fluff.",
];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The adjudication step failed; terminal for the run.
#[derive(Debug, Error)]
pub enum AdjudicationError {
    /// The service could not be reached or answered non-2xx.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The response is not the expected JSON object.
    #[error("malformed adjudication response: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },
    /// A decision targets an entry that was not in the request.
    #[error("decision for {location}, which was not under review")]
    UnknownTarget {
        /// The unexpected location.
        location: EntryLocation,
    },
    /// Two decisions target the same entry.
    #[error("more than one decision for {location}")]
    DuplicateDecision {
        /// The doubly-decided location.
        location: EntryLocation,
    },
    /// An entry under review received no decision.
    #[error("no decision for {location}")]
    MissingDecision {
        /// The undecided location.
        location: EntryLocation,
    },
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One entry under review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    /// Catalog file.
    pub file: RepoPath,
    /// Position within the file.
    pub index: usize,
    /// The schema-validated entry.
    pub entry: CatalogEntry,
}

impl ReviewItem {
    /// The item's location.
    pub fn location(&self) -> EntryLocation {
        EntryLocation::new(self.file.clone(), self.index)
    }
}

/// Task, output schema and hard rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instructions {
    /// What to do.
    pub task: &'static str,
    /// JSON schema the response must follow.
    pub output_json_schema: Value,
    /// Non-negotiable policy rules.
    pub hard_rules: Vec<&'static str>,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            task: TASK,
            output_json_schema: output_schema(),
            hard_rules: HARD_RULES.to_vec(),
        }
    }
}

fn output_schema() -> Value {
    json!({
        "type": "object",
        "required": ["summary", "decisions"],
        "properties": {
            "summary": { "type": "string" },
            "decisions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["file", "index", "action", "reason"],
                    "properties": {
                        "file": { "type": "string" },
                        "index": { "type": "integer" },
                        "action": { "type": "string", "enum": ["accept", "reject", "needs_changes"] },
                        "reason": { "type": "string" },
                        "proposed_entry": { "type": "object" },
                        "suggested_category": { "type": "string" },
                        "suggested_lenses": { "type": "array", "items": { "type": "string" } },
                        "quality": { "type": "string", "enum": ["exceptional", "solid", "niche"] }
                    }
                }
            }
        }
    })
}

/// The single request a run sends to the adjudicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjudicationRequest {
    /// Policy document, verbatim.
    pub policy: Value,
    /// Allowed `category` values.
    pub allowed_categories: Vec<String>,
    /// Allowed `lenses` values.
    pub allowed_lenses: Vec<String>,
    /// Entries under review, sorted by file then position.
    pub changed_entries: Vec<ReviewItem>,
    /// Reachability results keyed by normalized URL.
    pub url_checks: BTreeMap<String, String>,
    /// Task, output schema and hard rules.
    pub instructions: Instructions,
}

impl AdjudicationRequest {
    /// Builds the request.
    ///
    /// Entries are sorted by location and de-duplicated (last write wins), so
    /// the same inputs always render the same payload.
    pub fn new(
        policy: &PolicyBundle,
        entries: impl IntoIterator<Item = (EntryLocation, CatalogEntry)>,
        url_checks: &BTreeMap<String, ProbeOutcome>,
    ) -> Self {
        let sorted: BTreeMap<EntryLocation, CatalogEntry> = entries.into_iter().collect();
        let changed_entries = sorted
            .into_iter()
            .map(|(location, entry)| ReviewItem {
                file: location.file,
                index: location.index,
                entry,
            })
            .collect();

        Self {
            policy: policy.document.clone(),
            allowed_categories: policy.allowed_categories.clone(),
            allowed_lenses: policy.allowed_lenses.clone(),
            changed_entries,
            url_checks: url_checks
                .iter()
                .map(|(url, outcome)| (normalize(url), outcome.summary()))
                .collect(),
            instructions: Instructions::default(),
        }
    }

    /// Every location under review.
    pub fn locations(&self) -> BTreeSet<EntryLocation> {
        self.changed_entries.iter().map(ReviewItem::location).collect()
    }

    /// Renders the request as the pretty-printed JSON prompt body.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// The adjudicator's verdict on one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The entry complies with policy.
    Accept,
    /// The entry violates policy and must not be merged.
    Reject,
    /// The entry could comply after changes by the contributor.
    NeedsChanges,
}

impl Action {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Reject => "reject",
            Action::NeedsChanges => "needs_changes",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of the response's `decisions` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Catalog file the decision is about.
    pub file: RepoPath,
    /// Position within the file.
    pub index: usize,
    /// The verdict.
    pub action: Action,
    /// Explanation for the contributor.
    pub reason: String,
    /// Normalized replacement entry; untrusted until re-validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_entry: Option<Value>,
    /// Closest allowed category, when the current one is wrong.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_category: Option<String>,
    /// Better-fitting lenses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_lenses: Option<Vec<String>>,
    /// Assessed editorial tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
}

impl Decision {
    /// The decided location.
    pub fn location(&self) -> EntryLocation {
        EntryLocation::new(self.file.clone(), self.index)
    }
}

/// A structurally valid adjudication response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicationResponse {
    /// Overall summary for the report.
    pub summary: String,
    /// One decision per entry under review, in response order.
    pub decisions: Vec<Decision>,
}

/// Parses and structurally validates raw response text against `request`.
///
/// The text may be wrapped in a single Markdown code fence. Anything else
/// must be a JSON object with `summary` and `decisions`; every decision must
/// target a requested entry, at most once, and every requested entry must be
/// decided.
pub fn parse_response(
    text: &str,
    request: &AdjudicationRequest,
) -> Result<AdjudicationResponse, AdjudicationError> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body).map_err(|e| AdjudicationError::Malformed {
        reason: format!("not JSON: {e}"),
    })?;
    if !value.is_object() {
        return Err(AdjudicationError::Malformed {
            reason: "top level is not an object".to_string(),
        });
    }
    let response: AdjudicationResponse =
        serde_json::from_value(value).map_err(|e| AdjudicationError::Malformed {
            reason: e.to_string(),
        })?;

    let requested = request.locations();
    let mut decided = BTreeSet::new();
    for decision in &response.decisions {
        let location = decision.location();
        if !requested.contains(&location) {
            return Err(AdjudicationError::UnknownTarget { location });
        }
        if !decided.insert(location.clone()) {
            return Err(AdjudicationError::DuplicateDecision { location });
        }
    }
    if let Some(location) = requested.difference(&decided).next() {
        return Err(AdjudicationError::MissingDecision {
            location: location.clone(),
        });
    }

    Ok(response)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}
