//! Expanding a contributor's bare URL into a full catalog entry.
//!
//! The generator is an external service and its output is untrusted exactly
//! like an adjudication response: [`accept_generated`] re-validates
//! everything before the entry is written.

use serde::Serialize;
use serde_json::Value;

use crate::policy::PolicyBundle;
use crate::schema::EntrySchema;
use crate::urls::{normalize, UrlPolicy};
use crate::{CatalogEntry, Finding, FindingKind, RepoPath};

/// Input to [`crate::ports::ContentGenerator::generate_entry`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// The normalized submitted URL.
    pub url: String,
    /// Suggested `id`, derived from the host.
    pub slug: String,
    /// Policy document, verbatim.
    pub policy: Value,
    /// Allowed `category` values.
    pub allowed_categories: Vec<String>,
    /// Allowed `lenses` values.
    pub allowed_lenses: Vec<String>,
}

impl GenerationRequest {
    /// Builds a request for `url` against `policy`.
    pub fn new(url: impl Into<String>, slug: impl Into<String>, policy: &PolicyBundle) -> Self {
        Self {
            url: url.into(),
            slug: slug.into(),
            policy: policy.document.clone(),
            allowed_categories: policy.allowed_categories.clone(),
            allowed_lenses: policy.allowed_lenses.clone(),
        }
    }
}

/// Validates a generated entry destined for `target`.
///
/// The entry must pass the schema and its URL must pass `urls`. Its URL must
/// normalize to the submitted one and its `id` must equal `slug`, the id the
/// `target` path was derived from, so the generator can neither swap in a
/// different site nor write an entry whose id disagrees with its file. Every
/// problem is returned as a blocking finding.
pub fn accept_generated(
    raw: &Value,
    submitted_url: &str,
    slug: &str,
    target: &RepoPath,
    schema: &EntrySchema,
    urls: &UrlPolicy,
) -> Result<CatalogEntry, Vec<Finding>> {
    let entry = schema.validate(raw).map_err(|violations| {
        violations
            .into_iter()
            .map(|v| {
                Finding::blocking(
                    FindingKind::Generation,
                    Some(target.clone()),
                    format!("generated entry: {v}"),
                )
            })
            .collect::<Vec<_>>()
    })?;

    let mut findings = Vec::new();
    if let Err(rejection) = urls.check(&entry.url) {
        findings.push(Finding::blocking(
            FindingKind::UrlRejected,
            Some(target.clone()),
            format!("generated url `{}`: {rejection}", entry.url),
        ));
    }
    if normalize(&entry.url) != normalize(submitted_url) {
        findings.push(Finding::blocking(
            FindingKind::Generation,
            Some(target.clone()),
            format!(
                "generated url `{}` does not match the submitted url `{}`",
                entry.url,
                normalize(submitted_url)
            ),
        ));
    }
    if entry.id != slug {
        findings.push(Finding::blocking(
            FindingKind::Generation,
            Some(target.clone()),
            format!("generated id `{}` does not match the expected id `{slug}`", entry.id),
        ));
    }

    if findings.is_empty() {
        Ok(entry)
    } else {
        Err(findings)
    }
}
