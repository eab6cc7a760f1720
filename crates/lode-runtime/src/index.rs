use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lode_core::{Guid, TypeId};

use crate::{AssetFile, TaskResult};

/// Index record of one asset on disk.
#[derive(Clone, Debug)]
pub struct AssetIndexEntry {
    /// Asset identity.
    pub guid: Guid,
    /// Human-readable asset name.
    pub name: String,
    /// Registered type of the asset payload.
    pub type_id: TypeId,
    /// File the asset loads from.
    pub path: PathBuf,
}

/// In-memory index of all known assets, loaded or not.
///
/// A GUID stays in the index while its asset is unloaded; loading
/// materializes the object in the corresponding pool.
#[derive(Default)]
pub struct AssetIndex {
    entries: HashMap<Guid, AssetIndexEntry>,
}

impl AssetIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, entry: AssetIndexEntry) {
        self.entries.insert(entry.guid, entry);
    }

    /// Looks up an entry.
    pub fn get(&self, guid: Guid) -> Option<&AssetIndexEntry> {
        self.entries.get(&guid)
    }

    /// Removes an entry.
    pub fn remove(&mut self, guid: Guid) -> Option<AssetIndexEntry> {
        self.entries.remove(&guid)
    }

    /// Number of indexed assets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// GUIDs whose asset name contains `needle`, sorted by name.
    pub fn find_guids_by_name(&self, needle: &str) -> Vec<Guid> {
        let mut found: Vec<&AssetIndexEntry> = self
            .entries
            .values()
            .filter(|entry| entry.name.contains(needle))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.into_iter().map(|entry| entry.guid).collect()
    }

    /// Walks a directory tree and indexes every parseable asset file.
    ///
    /// Files that fail to parse are reported in the result but do not stop
    /// the scan.
    pub fn scan(&mut self, root: &Path) -> TaskResult {
        let mut result = TaskResult::ok();
        self.scan_dir(root, &mut result);
        result
    }

    fn scan_dir(&mut self, dir: &Path, result: &mut TaskResult) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                result.fail(Guid::INVALID, format!("cannot read '{}': {err}", dir.display()));
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_dir(&path, result);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                match AssetFile::read(&path) {
                    Ok(file) => match file.index_entry(&path) {
                        Ok(entry) => self.insert(entry),
                        Err(err) => result.fail(file.guid, err.to_string()),
                    },
                    Err(err) => {
                        result.fail(
                            Guid::INVALID,
                            format!("cannot index '{}': {err}", path.display()),
                        );
                    }
                }
            }
        }
    }
}
