//! The versioned policy documents a run is judged against.
//!
//! Three declarative documents live in the repository: the policy itself,
//! the category allow-list and the lens allow-list. Infrastructure loads them
//! as untyped values; [`PolicyBundle::from_documents`] extracts what the
//! validators need and keeps the policy verbatim for the adjudicator.

use serde_json::Value;

use crate::errors::GateError;
use crate::schema::EntrySchema;
use crate::urls::UrlPolicy;

/// Policy, allow-lists and denylist for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyBundle {
    /// The policy document, embedded verbatim in prompts.
    pub document: Value,
    /// Allowed `category` values.
    pub allowed_categories: Vec<String>,
    /// Allowed `lenses` values.
    pub allowed_lenses: Vec<String>,
    /// Extra denylist substrings from the policy's `denylist` key. Empty means
    /// the built-in defaults.
    pub denylist: Vec<String>,
}

impl PolicyBundle {
    /// Builds the bundle from the three documents.
    ///
    /// The allow-lists are read from the `categories` and `lenses` keys of
    /// their documents, falling back to the same keys on the policy document.
    /// An empty category allow-list is a configuration error: no entry could
    /// ever validate.
    pub fn from_documents(
        policy: Value,
        categories: Option<Value>,
        lenses: Option<Value>,
    ) -> Result<Self, GateError> {
        let allowed_categories = string_list(categories.as_ref(), "categories")?
            .or(string_list(Some(&policy), "categories")?)
            .unwrap_or_default();
        let allowed_lenses = string_list(lenses.as_ref(), "lenses")?
            .or(string_list(Some(&policy), "lenses")?)
            .unwrap_or_default();
        let denylist = string_list(Some(&policy), "denylist")?.unwrap_or_default();

        if allowed_categories.is_empty() {
            return Err(GateError::Configuration {
                message: "no allowed categories are declared".to_string(),
            });
        }

        Ok(Self {
            document: policy,
            allowed_categories,
            allowed_lenses,
            denylist,
        })
    }

    /// The entry schema bound to this bundle's allow-lists.
    pub fn schema(&self) -> EntrySchema {
        EntrySchema::new(self.allowed_categories.clone(), self.allowed_lenses.clone())
    }

    /// The URL acceptability rules, with the built-in denylist when the
    /// policy declares none.
    pub fn url_policy(&self) -> UrlPolicy {
        if self.denylist.is_empty() {
            UrlPolicy::default()
        } else {
            UrlPolicy::new(self.denylist.iter().cloned())
        }
    }
}

fn string_list(doc: Option<&Value>, key: &str) -> Result<Option<Vec<String>>, GateError> {
    let Some(value) = doc.and_then(|d| d.get(key)) else {
        return Ok(None);
    };
    let Some(items) = value.as_array() else {
        return Err(GateError::Configuration {
            message: format!("`{key}` must be a list of strings"),
        });
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| GateError::Configuration {
                    message: format!("`{key}` contains a non-string item: {item}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
