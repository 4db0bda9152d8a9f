//! Folder deduplication
//!
//! Two folders carrying the same work id would race to write the same catalog
//! row, so discovery output is collapsed to one folder per id before any
//! ingestion is dispatched. The last folder encountered for an id wins; the
//! others are reported as duplicates and counted as skipped.

use core_library::models::FolderDescriptor;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduplicated {
    /// One folder per id, in the order their winning occurrences were found.
    pub canonical: Vec<FolderDescriptor>,
    /// Discarded folders per id, in discovery order.
    pub duplicates: BTreeMap<u32, Vec<FolderDescriptor>>,
}

impl Deduplicated {
    /// Number of discarded folders.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates.values().map(Vec::len).sum()
    }

    /// The folder kept for `id`.
    pub fn canonical_for(&self, id: u32) -> Option<&FolderDescriptor> {
        self.canonical.iter().find(|folder| folder.work_id == id)
    }
}

pub fn deduplicate(folders: Vec<FolderDescriptor>) -> Deduplicated {
    let mut last_seen: HashMap<u32, usize> = HashMap::with_capacity(folders.len());
    for (index, folder) in folders.iter().enumerate() {
        last_seen.insert(folder.work_id, index);
    }

    let mut result = Deduplicated::default();
    for (index, folder) in folders.into_iter().enumerate() {
        if last_seen.get(&folder.work_id) == Some(&index) {
            result.canonical.push(folder);
        } else {
            result
                .duplicates
                .entry(folder.work_id)
                .or_default()
                .push(folder);
        }
    }
    result
}
