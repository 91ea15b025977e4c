//! The approval marker as a file in the working tree.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use pipeline::ports::{ApprovalMarker, MarkerError};

const MARKER_CONTENT: &str = "approved\n";

/// [`ApprovalMarker`] backed by a file whose existence is the signal.
#[derive(Debug, Clone)]
pub struct FileApprovalMarker {
    path: PathBuf,
}

impl FileApprovalMarker {
    /// Marker at `path` (absolute, or relative to the process directory).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn error(&self, err: std::io::Error) -> MarkerError {
        MarkerError {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl ApprovalMarker for FileApprovalMarker {
    fn set(&self) -> Result<(), MarkerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        fs::write(&self.path, MARKER_CONTENT).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "Approval marker set");
        Ok(())
    }

    fn clear(&self) -> Result<(), MarkerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Approval marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }

    fn is_set(&self) -> bool {
        self.path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_creates_parents_and_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let marker = FileApprovalMarker::new(dir.path().join(".github/ai_review/APPROVED"));
        assert!(!marker.is_set());

        marker.set().unwrap();
        assert!(marker.is_set());
        marker.set().unwrap();

        marker.clear().unwrap();
        assert!(!marker.is_set());
        marker.clear().unwrap();
    }

    #[test]
    fn set_fails_when_the_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blocker"), "x").unwrap();
        let marker = FileApprovalMarker::new(dir.path().join("blocker/APPROVED"));
        let err = marker.set().unwrap_err();
        assert!(err.path.ends_with("APPROVED"));
    }
}
