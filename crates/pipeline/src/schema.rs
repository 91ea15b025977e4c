//! Structured-entry schema.
//!
//! [`EntrySchema`] is the declarative shape every catalog entry must have.
//! It is the only way to obtain a [`CatalogEntry`], so both contributor
//! entries and adjudicator-proposed entries pass through the same checks
//! before anything is written.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{CatalogEntry, LocalizedText, Quality};

/// Fields an entry must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["id", "url", "category", "title", "description"];

const KNOWN_FIELDS: [&str; 7] = [
    "id",
    "url",
    "category",
    "lenses",
    "quality",
    "title",
    "description",
];

/// One schema rule an entry violates.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SchemaViolation {
    /// The entry is not a mapping.
    #[error("entry must be a mapping")]
    NotAMapping,
    /// A required field is absent.
    #[error("missing required field `{field}`")]
    MissingField {
        /// Field name.
        field: String,
    },
    /// A field has the wrong JSON/YAML type.
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Field name.
        field: String,
        /// Human-readable expected type.
        expected: String,
    },
    /// A field the schema does not know.
    #[error("unknown field `{field}`")]
    UnknownField {
        /// Field name.
        field: String,
    },
    /// `id` is not a lowercase slug.
    #[error("id `{id}` must be a lowercase slug (a-z, 0-9, single dashes)")]
    InvalidId {
        /// Offending id.
        id: String,
    },
    /// `category` is not on the allow-list.
    #[error("category `{category}` is not allowed")]
    CategoryNotAllowed {
        /// Offending category.
        category: String,
    },
    /// More lenses than the cap.
    #[error("at most {max} lenses allowed (found {count})")]
    TooManyLenses {
        /// Number of lenses given.
        count: usize,
        /// Configured cap.
        max: usize,
    },
    /// A lens is not on the allow-list.
    #[error("lens `{lens}` is not allowed")]
    LensNotAllowed {
        /// Offending lens.
        lens: String,
    },
    /// The same lens appears twice.
    #[error("lens `{lens}` is listed more than once")]
    DuplicateLens {
        /// Repeated lens.
        lens: String,
    },
    /// `quality` is outside the three-value enum.
    #[error("quality `{value}` must be one of exceptional, solid, niche")]
    InvalidQuality {
        /// Offending value.
        value: String,
    },
    /// A localized text map is empty or has an empty value.
    #[error("`{field}` must map at least one language to non-empty text")]
    EmptyText {
        /// Field name.
        field: String,
    },
    /// A description exceeds the length cap.
    #[error("description ({lang}) is {length} characters, max {max}")]
    DescriptionTooLong {
        /// Language code.
        lang: String,
        /// Actual length in characters.
        length: usize,
        /// Configured cap.
        max: usize,
    },
}

/// Declarative constraints for catalog entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySchema {
    /// Allowed `category` values.
    pub allowed_categories: Vec<String>,
    /// Allowed `lenses` values.
    pub allowed_lenses: Vec<String>,
    /// Maximum number of lenses per entry.
    pub max_lenses: usize,
    /// Maximum description length per language, in characters.
    pub max_description_chars: usize,
}

impl EntrySchema {
    /// Creates a schema with the standard caps (4 lenses, 160-char descriptions).
    pub fn new(allowed_categories: Vec<String>, allowed_lenses: Vec<String>) -> Self {
        Self {
            allowed_categories,
            allowed_lenses,
            max_lenses: 4,
            max_description_chars: 160,
        }
    }

    /// Validates a raw entry and converts it to a [`CatalogEntry`].
    ///
    /// All violations are collected; none are silently dropped.
    pub fn validate(&self, raw: &Value) -> Result<CatalogEntry, Vec<SchemaViolation>> {
        let Some(map) = raw.as_object() else {
            return Err(vec![SchemaViolation::NotAMapping]);
        };

        let mut violations = Vec::new();

        for field in REQUIRED_FIELDS {
            if !map.contains_key(field) {
                violations.push(SchemaViolation::MissingField {
                    field: field.to_string(),
                });
            }
        }
        for key in map.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                violations.push(SchemaViolation::UnknownField { field: key.clone() });
            }
        }

        let id = string_field(map, "id", &mut violations);
        if let Some(id) = &id {
            if !is_slug(id) {
                violations.push(SchemaViolation::InvalidId { id: id.clone() });
            }
        }

        let url = string_field(map, "url", &mut violations);

        let category = string_field(map, "category", &mut violations);
        if let Some(category) = &category {
            if !self.allowed_categories.iter().any(|c| c == category) {
                violations.push(SchemaViolation::CategoryNotAllowed {
                    category: category.clone(),
                });
            }
        }

        let lenses = self.lenses(map, &mut violations);

        let quality = match map.get("quality") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                let parsed = Quality::parse(s);
                if parsed.is_none() {
                    violations.push(SchemaViolation::InvalidQuality { value: s.clone() });
                }
                parsed
            }
            Some(other) => {
                violations.push(SchemaViolation::InvalidQuality {
                    value: other.to_string(),
                });
                None
            }
        };

        let title = text_field(map, "title", &mut violations);
        let description = text_field(map, "description", &mut violations);
        if let Some(description) = &description {
            for (lang, text) in description {
                let length = text.chars().count();
                if length > self.max_description_chars {
                    violations.push(SchemaViolation::DescriptionTooLong {
                        lang: lang.clone(),
                        length,
                        max: self.max_description_chars,
                    });
                }
            }
        }

        match (id, url, category, title, description) {
            (Some(id), Some(url), Some(category), Some(title), Some(description))
                if violations.is_empty() =>
            {
                Ok(CatalogEntry {
                    id,
                    url,
                    category,
                    lenses,
                    quality,
                    title,
                    description,
                })
            }
            _ => Err(violations),
        }
    }

    fn lenses(&self, map: &Map<String, Value>, violations: &mut Vec<SchemaViolation>) -> Vec<String> {
        let items = match map.get("lenses") {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                violations.push(wrong_type("lenses", "a list of strings"));
                return Vec::new();
            }
        };

        if items.len() > self.max_lenses {
            violations.push(SchemaViolation::TooManyLenses {
                count: items.len(),
                max: self.max_lenses,
            });
        }

        let mut lenses: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let Some(lens) = item.as_str() else {
                violations.push(wrong_type("lenses", "a list of strings"));
                continue;
            };
            if !self.allowed_lenses.iter().any(|l| l == lens) {
                violations.push(SchemaViolation::LensNotAllowed {
                    lens: lens.to_string(),
                });
            }
            if lenses.iter().any(|l| l == lens) {
                violations.push(SchemaViolation::DuplicateLens {
                    lens: lens.to_string(),
                });
                continue;
            }
            lenses.push(lens.to_string());
        }
        lenses
    }
}

fn wrong_type(field: &str, expected: &str) -> SchemaViolation {
    SchemaViolation::WrongType {
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

fn string_field(
    map: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<SchemaViolation>,
) -> Option<String> {
    match map.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => {
            violations.push(wrong_type(field, "a non-empty string"));
            None
        }
    }
}

fn text_field(
    map: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<SchemaViolation>,
) -> Option<LocalizedText> {
    let Value::Object(langs) = map.get(field)? else {
        violations.push(wrong_type(field, "a mapping of language to text"));
        return None;
    };

    let mut text = LocalizedText::new();
    for (lang, value) in langs {
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => {
                text.insert(lang.clone(), s.to_string());
            }
            _ => {
                violations.push(SchemaViolation::EmptyText {
                    field: field.to_string(),
                });
                return None;
            }
        }
    }
    if text.is_empty() {
        violations.push(SchemaViolation::EmptyText {
            field: field.to_string(),
        });
        return None;
    }
    Some(text)
}

fn is_slug(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('-')
        && !id.ends_with('-')
        && !id.contains("--")
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> EntrySchema {
        EntrySchema::new(
            vec!["Knowledge".into(), "Tools".into()],
            vec!["learning".into(), "reference".into(), "design".into(), "dev".into(), "fun".into()],
        )
    }

    fn valid() -> Value {
        json!({
            "id": "example-com",
            "url": "https://example.com",
            "category": "Knowledge",
            "lenses": ["learning"],
            "quality": "solid",
            "title": {"en": "Example"},
            "description": {"en": "An example site."}
        })
    }

    #[test]
    fn valid_entry_converts() {
        let entry = schema().validate(&valid()).unwrap();
        assert_eq!(entry.id, "example-com");
        assert_eq!(entry.quality, Some(Quality::Solid));
        assert_eq!(entry.lenses, vec!["learning".to_string()]);
    }

    #[test]
    fn missing_description_is_reported() {
        let mut raw = valid();
        raw.as_object_mut().unwrap().remove("description");
        let errs = schema().validate(&raw).unwrap_err();
        assert_eq!(
            errs,
            vec![SchemaViolation::MissingField {
                field: "description".into()
            }]
        );
    }

    #[test]
    fn all_violations_are_collected() {
        let raw = json!({
            "id": "Not A Slug",
            "url": "https://example.com",
            "category": "Casino",
            "lenses": ["learning", "learning", "x", "design", "dev"],
            "quality": "great",
            "title": {"en": ""},
            "description": {"en": "a".repeat(161)},
            "extra": true
        });
        let errs = schema().validate(&raw).unwrap_err();
        assert!(errs.contains(&SchemaViolation::UnknownField { field: "extra".into() }));
        assert!(errs.contains(&SchemaViolation::InvalidId { id: "Not A Slug".into() }));
        assert!(errs.contains(&SchemaViolation::CategoryNotAllowed { category: "Casino".into() }));
        assert!(errs.contains(&SchemaViolation::TooManyLenses { count: 5, max: 4 }));
        assert!(errs.contains(&SchemaViolation::DuplicateLens { lens: "learning".into() }));
        assert!(errs.contains(&SchemaViolation::LensNotAllowed { lens: "x".into() }));
        assert!(errs.contains(&SchemaViolation::InvalidQuality { value: "great".into() }));
        assert!(errs.contains(&SchemaViolation::EmptyText { field: "title".into() }));
        assert!(errs.contains(&SchemaViolation::DescriptionTooLong {
            lang: "en".into(),
            length: 161,
            max: 160
        }));
    }

    #[test]
    fn non_mapping_is_rejected() {
        assert_eq!(
            schema().validate(&json!("https://example.com")).unwrap_err(),
            vec![SchemaViolation::NotAMapping]
        );
    }

    #[test]
    fn lenses_and_quality_are_optional() {
        let mut raw = valid();
        let map = raw.as_object_mut().unwrap();
        map.remove("lenses");
        map.remove("quality");
        let entry = schema().validate(&raw).unwrap();
        assert!(entry.lenses.is_empty());
        assert_eq!(entry.quality, None);
    }

    #[test]
    fn validated_entry_serializes_in_schema_order() {
        let entry = schema().validate(&valid()).unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["id", "url", "category", "lenses", "quality", "title", "description"]
        );
    }
}
