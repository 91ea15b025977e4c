//! Global URL-uniqueness index over the committed catalog.
//!
//! Rebuilt from scratch on every run: the catalog is the single source of
//! truth and small enough to scan in full. The key is always
//! [`crate::urls::normalize`]d, so no other component needs to normalize
//! before a lookup.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ports::CatalogFile;
use crate::urls::normalize;
use crate::EntryLocation;

/// Normalized URL → every location it occurs at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlIndex {
    locations: BTreeMap<String, Vec<EntryLocation>>,
}

impl UrlIndex {
    /// Builds the index from loaded catalog files.
    ///
    /// Files are visited in path order and entries in position order, so every
    /// location list is ordered by file then position. Entries without a
    /// string `url` are not indexed.
    pub fn build<'a>(files: impl IntoIterator<Item = &'a CatalogFile>) -> Self {
        let mut sorted: Vec<&CatalogFile> = files.into_iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut index = Self::default();
        for file in sorted {
            for (position, entry) in file.entries.iter().enumerate() {
                if let Some(url) = entry.get("url").and_then(|u| u.as_str()) {
                    index.insert(url, EntryLocation::new(file.path.clone(), position));
                }
            }
        }
        index
    }

    /// Records one occurrence of `url`.
    pub fn insert(&mut self, url: &str, location: EntryLocation) {
        let key = normalize(url);
        if key.is_empty() {
            return;
        }
        let slot = self.locations.entry(key).or_default();
        if let Err(at) = slot.binary_search(&location) {
            slot.insert(at, location);
        }
    }

    /// Every location `url` occurs at (normalized before lookup).
    pub fn locations(&self, url: &str) -> &[EntryLocation] {
        self.locations
            .get(&normalize(url))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns `true` if `url` occurs anywhere in the catalog.
    pub fn contains(&self, url: &str) -> bool {
        !self.locations(url).is_empty()
    }

    /// URLs occurring at more than one location, with all their locations.
    pub fn duplicates(&self) -> impl Iterator<Item = (&str, &[EntryLocation])> {
        self.locations
            .iter()
            .filter(|(_, locs)| locs.len() > 1)
            .map(|(url, locs)| (url.as_str(), locs.as_slice()))
    }

    /// Number of distinct normalized URLs.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
