//! Loading the policy documents from the checkout.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use pipeline::policy::PolicyBundle;
use pipeline::GateError;

/// Where the policy documents live, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyFiles {
    /// Free-form policy document; required.
    pub policy: String,
    /// Category allow-list (`categories:` key); optional.
    pub categories: String,
    /// Lens allow-list (`lenses:` key); optional.
    pub lenses: String,
}

impl Default for PolicyFiles {
    fn default() -> Self {
        Self {
            policy: "ai/policy.yml".to_string(),
            categories: "ai/categories.yml".to_string(),
            lenses: "ai/lenses.yml".to_string(),
        }
    }
}

/// Reads the policy bundle from `repo_root`.
///
/// A missing or unparsable policy document is a configuration error. The
/// allow-list documents may be absent, in which case the same keys on the
/// policy document are used.
#[instrument(skip_all, fields(root = %repo_root.display()))]
pub fn load_policy(repo_root: &Path, files: &PolicyFiles) -> Result<PolicyBundle, GateError> {
    let policy = read_yaml(repo_root, &files.policy)?.ok_or_else(|| GateError::Configuration {
        message: format!("policy document `{}` not found", files.policy),
    })?;
    let categories = read_yaml(repo_root, &files.categories)?;
    let lenses = read_yaml(repo_root, &files.lenses)?;

    let bundle = PolicyBundle::from_documents(policy, categories, lenses)?;
    debug!(
        categories = bundle.allowed_categories.len(),
        lenses = bundle.allowed_lenses.len(),
        "Policy loaded"
    );
    Ok(bundle)
}

fn read_yaml(root: &Path, rel: &str) -> Result<Option<Value>, GateError> {
    let text = match fs::read_to_string(root.join(rel)) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(GateError::Configuration {
                message: format!("cannot read `{rel}`: {e}"),
            })
        }
    };
    let value: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| GateError::Configuration {
            message: format!("`{rel}` is not valid YAML: {e}"),
        })?;
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| GateError::Configuration {
            message: format!("`{rel}` cannot be represented as JSON: {e}"),
        })
}
