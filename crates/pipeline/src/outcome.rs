//! Turning adjudication decisions into a verdict and a write plan.
//!
//! Rejection dominates: a single `reject` fails the run and suppresses every
//! fix, however many `accept` decisions accompany it. The approval marker is
//! set only for [`Verdict::Approved`].

use serde::Serialize;
use tracing::warn;

use crate::adjudication::{Action, Decision};
use crate::context::ReviewMode;
use crate::schema::EntrySchema;
use crate::urls::UrlPolicy;
use crate::{CatalogEntry, EntryLocation, Finding, FindingKind};

/// Decision counts by action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionTally {
    /// `accept` decisions.
    pub accept: usize,
    /// `reject` decisions.
    pub reject: usize,
    /// `needs_changes` decisions.
    pub needs_changes: usize,
}

impl DecisionTally {
    /// Counts `decisions`.
    pub fn count(decisions: &[Decision]) -> Self {
        decisions.iter().fold(Self::default(), |mut tally, d| {
            match d.action {
                Action::Accept => tally.accept += 1,
                Action::Reject => tally.reject += 1,
                Action::NeedsChanges => tally.needs_changes += 1,
            }
            tally
        })
    }

    /// Total number of decisions.
    pub fn total(&self) -> usize {
        self.accept + self.reject + self.needs_changes
    }
}

/// The overall adjudication result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every decision is `accept`.
    Approved,
    /// At least one `needs_changes`, no `reject`.
    NeedsChanges,
    /// At least one `reject`.
    Rejected,
    /// Nothing was decided, so nothing can be approved.
    Undecided,
}

impl Verdict {
    /// Derives the verdict from a tally.
    pub fn from_tally(tally: &DecisionTally) -> Self {
        if tally.reject > 0 {
            Verdict::Rejected
        } else if tally.needs_changes > 0 {
            Verdict::NeedsChanges
        } else if tally.total() == 0 {
            Verdict::Undecided
        } else {
            Verdict::Approved
        }
    }

    /// Returns `true` only for [`Verdict::Approved`].
    pub fn is_approved(self) -> bool {
        self == Verdict::Approved
    }
}

/// One accepted fix that passed re-validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedWrite {
    /// Where the entry is written.
    pub location: EntryLocation,
    /// The re-validated replacement.
    pub entry: CatalogEntry,
}

/// Fixes to apply, plus the proposals that were refused.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutofixPlan {
    /// Writes that passed schema and URL re-validation, in decision order.
    pub writes: Vec<PlannedWrite>,
    /// One advisory finding per refused proposal.
    pub skipped: Vec<Finding>,
}

impl AutofixPlan {
    /// Returns `true` if nothing will be written.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Plans the in-place writes for accepted proposals.
///
/// Produces an empty plan in comment-only mode or when any decision is a
/// `reject`. Each `accept` carrying a `proposed_entry` is re-validated
/// against `schema` and `urls`; failures are skipped with an advisory
/// finding and never abort the batch.
pub fn plan_autofix(
    decisions: &[Decision],
    mode: ReviewMode,
    schema: &EntrySchema,
    urls: &UrlPolicy,
) -> AutofixPlan {
    let mut plan = AutofixPlan::default();
    if mode != ReviewMode::Autofix || DecisionTally::count(decisions).reject > 0 {
        return plan;
    }

    for decision in decisions.iter().filter(|d| d.action == Action::Accept) {
        let Some(proposed) = &decision.proposed_entry else {
            continue;
        };
        let location = decision.location();

        let entry = match schema.validate(proposed) {
            Ok(entry) => entry,
            Err(violations) => {
                let detail = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(%location, %detail, "Proposed entry failed schema re-validation");
                plan.skipped.push(
                    Finding::advisory(
                        FindingKind::Write,
                        Some(location.file.clone()),
                        format!("proposed fix not applied: {detail}"),
                    )
                    .at(format!("entry #{}", location.index)),
                );
                continue;
            }
        };

        if let Err(rejection) = urls.check(&entry.url) {
            warn!(%location, %rejection, "Proposed entry has an unacceptable URL");
            plan.skipped.push(
                Finding::advisory(
                    FindingKind::Write,
                    Some(location.file.clone()),
                    format!("proposed fix not applied: {rejection}"),
                )
                .at(format!("entry #{}", location.index)),
            );
            continue;
        }

        plan.writes.push(PlannedWrite { location, entry });
    }
    plan
}
