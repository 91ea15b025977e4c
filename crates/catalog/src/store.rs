//! YAML catalog files on the checked-out working tree.
//!
//! A catalog file holds either a single mapping (one entry at position 0) or
//! a sequence of mappings. Loading converts YAML to JSON values with field
//! order intact; replacing an entry rewrites only that file, and within it
//! only the targeted position changes value.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use serde_yaml::Value as Yaml;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use pipeline::ports::{CatalogFile, CatalogStore, StoreError};
use pipeline::{CatalogEntry, RepoPath};

/// [`CatalogStore`] rooted at a repository checkout.
#[derive(Debug, Clone)]
pub struct YamlCatalogStore {
    root: PathBuf,
}

/// On-disk layout of one catalog file.
enum Layout {
    Single(Yaml),
    Sequence(Vec<Yaml>),
    Empty,
}

impl Layout {
    fn len(&self) -> usize {
        match self {
            Layout::Single(_) => 1,
            Layout::Sequence(items) => items.len(),
            Layout::Empty => 0,
        }
    }

    fn entries(&self) -> Vec<&Yaml> {
        match self {
            Layout::Single(item) => vec![item],
            Layout::Sequence(items) => items.iter().collect(),
            Layout::Empty => Vec::new(),
        }
    }
}

impl YamlCatalogStore {
    /// Creates a store over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, path: &RepoPath) -> PathBuf {
        self.root.join(path.as_str())
    }

    fn io_error(path: &RepoPath, err: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    fn parse_error(path: &RepoPath, message: impl Into<String>) -> StoreError {
        StoreError::Parse {
            path: path.to_string(),
            message: message.into(),
        }
    }

    fn read_layout(&self, path: &RepoPath) -> Result<Layout, StoreError> {
        let text = fs::read_to_string(self.absolute(path)).map_err(|e| Self::io_error(path, e))?;
        let doc: Yaml =
            serde_yaml::from_str(&text).map_err(|e| Self::parse_error(path, e.to_string()))?;
        match doc {
            Yaml::Null => Ok(Layout::Empty),
            Yaml::Mapping(_) => Ok(Layout::Single(doc)),
            Yaml::Sequence(items) => {
                if let Some(pos) = items.iter().position(|i| !i.is_mapping()) {
                    return Err(Self::parse_error(
                        path,
                        format!("item {pos} is not a mapping"),
                    ));
                }
                Ok(Layout::Sequence(items))
            }
            _ => Err(Self::parse_error(
                path,
                "expected a mapping or a sequence of mappings",
            )),
        }
    }

    fn write_yaml(&self, path: &RepoPath, doc: &Yaml) -> Result<(), StoreError> {
        let text = serde_yaml::to_string(doc).map_err(|e| Self::parse_error(path, e.to_string()))?;
        fs::write(self.absolute(path), text).map_err(|e| Self::io_error(path, e))
    }

    fn entry_yaml(path: &RepoPath, entry: &CatalogEntry) -> Result<Yaml, StoreError> {
        serde_yaml::to_value(entry).map_err(|e| Self::parse_error(path, e.to_string()))
    }
}

impl CatalogStore for YamlCatalogStore {
    #[instrument(skip_all, fields(pattern = %pattern))]
    fn list_files(&self, pattern: &Regex) -> Result<Vec<RepoPath>, StoreError> {
        let mut found = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name().to_str() != Some(".git"));
        for dent in walker {
            let dent = dent.map_err(|e| StoreError::Io {
                path: self.root.display().to_string(),
                message: e.to_string(),
            })?;
            if !dent.file_type().is_file() {
                continue;
            }
            let Ok(rel) = dent.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if pattern.is_match(&rel) {
                if let Some(path) = RepoPath::new(rel) {
                    found.push(path);
                }
            }
        }
        found.sort();
        debug!(files = found.len(), "Catalog files discovered");
        Ok(found)
    }

    fn load(&self, path: &RepoPath) -> Result<CatalogFile, StoreError> {
        let layout = self.read_layout(path)?;
        let entries = layout
            .entries()
            .into_iter()
            .map(|item| {
                serde_json::to_value(item).map_err(|e| Self::parse_error(path, e.to_string()))
            })
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(CatalogFile {
            path: path.clone(),
            entries,
        })
    }

    fn read_text(&self, path: &RepoPath) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.absolute(path)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(path, e)),
        }
    }

    fn exists(&self, path: &RepoPath) -> bool {
        self.absolute(path).exists()
    }

    #[instrument(skip_all, fields(path = %path, index = index))]
    fn replace_entry(
        &self,
        path: &RepoPath,
        index: usize,
        entry: &CatalogEntry,
    ) -> Result<(), StoreError> {
        let replacement = Self::entry_yaml(path, entry)?;
        let doc = match self.read_layout(path)? {
            Layout::Single(_) if index == 0 => replacement,
            Layout::Sequence(mut items) if index < items.len() => {
                items[index] = replacement;
                Yaml::Sequence(items)
            }
            other => {
                return Err(StoreError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                    len: other.len(),
                })
            }
        };
        self.write_yaml(path, &doc)
    }

    fn create_entry_file(&self, path: &RepoPath, entry: &CatalogEntry) -> Result<(), StoreError> {
        let abs = self.absolute(path);
        if abs.exists() {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(path, e))?;
        }
        let doc = Self::entry_yaml(path, entry)?;
        self.write_yaml(path, &doc)
    }

    fn remove_file(&self, path: &RepoPath) -> Result<(), StoreError> {
        fs::remove_file(self.absolute(path)).map_err(|e| Self::io_error(path, e))
    }
}
