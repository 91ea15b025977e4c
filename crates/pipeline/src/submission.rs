//! Submission-file format validation.
//!
//! A contributor submission is a text file holding exactly one URL line.
//! Blank lines and `#` comments are ignored; everything else counts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::urls::normalize;

/// Longest accepted URL line, in characters.
pub const MAX_SUBMISSION_LINE: usize = 200;

/// The single URL extracted from a valid submission file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// The URL after [`normalize`].
    pub url: String,
    /// 1-based line number the URL was found on.
    pub line: usize,
}

/// One violated submission-format rule.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FormatViolation {
    /// Zero, or more than one, meaningful line.
    #[error("must contain exactly one line (found {found})")]
    LineCount {
        /// Number of non-empty, non-comment lines.
        found: usize,
    },
    /// Line longer than [`MAX_SUBMISSION_LINE`].
    #[error("line {line}: URL exceeds 200 characters (found {length})")]
    TooLong {
        /// 1-based line number.
        line: usize,
        /// Actual length in characters.
        length: usize,
    },
    /// Line does not start with `http://` or `https://`.
    #[error("line {line}: must be a valid HTTP/HTTPS URL")]
    Scheme {
        /// 1-based line number.
        line: usize,
    },
    /// Scheme present but no host follows it.
    #[error("line {line}: URL has no host")]
    MissingHost {
        /// 1-based line number.
        line: usize,
    },
}

/// Validates submission-file content.
///
/// Every violated rule is reported, not just the first, so the contributor
/// can fix the file in one pass.
pub fn validate_submission_text(text: &str) -> Result<SubmissionRecord, Vec<FormatViolation>> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let mut violations = Vec::new();
    if lines.len() != 1 {
        violations.push(FormatViolation::LineCount { found: lines.len() });
    }

    for &(line, content) in &lines {
        let length = content.chars().count();
        if length > MAX_SUBMISSION_LINE {
            violations.push(FormatViolation::TooLong { line, length });
            continue;
        }
        let lower = content.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            violations.push(FormatViolation::Scheme { line });
            continue;
        }
        if !has_host(content) {
            violations.push(FormatViolation::MissingHost { line });
        }
    }

    match (violations.is_empty(), lines.first()) {
        (true, Some(&(line, content))) => Ok(SubmissionRecord {
            url: normalize(content),
            line,
        }),
        _ => Err(violations),
    }
}

/// `true` when at least one non-space, non-slash character follows `://`.
fn has_host(line: &str) -> bool {
    line.split_once("://")
        .and_then(|(_, rest)| rest.chars().next())
        .is_some_and(|c| c != '/' && !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_url_is_accepted() {
        let record = validate_submission_text("https://example.com").unwrap();
        assert_eq!(record.url, "https://example.com");
        assert_eq!(record.line, 1);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let record =
            validate_submission_text("# my submission\n\n  https://example.com/  \n").unwrap();
        assert_eq!(record.url, "https://example.com");
        assert_eq!(record.line, 3);
    }

    #[test]
    fn extra_text_line_fails_line_count() {
        let errs = validate_submission_text("https://example.com\nextra text").unwrap_err();
        assert_eq!(errs[0], FormatViolation::LineCount { found: 2 });
        assert!(errs[0].to_string().contains("must contain exactly one line"));
        assert!(errs.contains(&FormatViolation::Scheme { line: 2 }));
    }

    #[test]
    fn empty_file_fails_line_count() {
        let errs = validate_submission_text("\n# nothing\n").unwrap_err();
        assert_eq!(errs, vec![FormatViolation::LineCount { found: 0 }]);
    }

    #[test]
    fn overlong_line_is_rejected() {
        let url = format!("https://example.com/{}", "a".repeat(200));
        let errs = validate_submission_text(&url).unwrap_err();
        assert!(matches!(errs[0], FormatViolation::TooLong { line: 1, .. }));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(validate_submission_text("HTTPS://example.com").is_ok());
        assert_eq!(
            validate_submission_text("ftp://example.com").unwrap_err(),
            vec![FormatViolation::Scheme { line: 1 }]
        );
    }

    #[test]
    fn missing_host_is_rejected() {
        assert_eq!(
            validate_submission_text("https:///path").unwrap_err(),
            vec![FormatViolation::MissingHost { line: 1 }]
        );
    }
}
