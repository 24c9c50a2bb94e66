//! Physical archive objects and the point-in-time inventory built from them.

use std::collections::{BTreeMap, BTreeSet};

/// One raw entry returned by an object store listing.
///
/// The generation token is kept as the store reports it; turning it into a
/// number is the lister's job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Full object key within the bucket (e.g. `archive/public/A.zip`).
    pub path: String,

    /// Opaque version token, if the store exposes one.
    pub generation: Option<String>,

    /// Zero-byte "directory" placeholder rather than a real object.
    pub is_marker: bool,
}

/// One physical archive object observed in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveObject {
    /// Full object key, unique within the bucket.
    pub path: String,

    /// Logical filename with the category segment stripped.
    pub basename: String,

    /// Partition label (`public`, `real`, ...) or empty when unpartitioned.
    pub category: String,

    /// Parsed generation; `None` when missing or unparseable.
    pub generation: Option<i64>,
}

/// Inventory of archive objects keyed by basename.
///
/// A basename with more than one object is a duplicate. Duplicates are only
/// ever reported, never resolved.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    by_basename: BTreeMap<String, Vec<ArchiveObject>>,
}

impl Inventory {
    pub fn insert(&mut self, object: ArchiveObject) {
        self.by_basename
            .entry(object.basename.clone())
            .or_default()
            .push(object);
    }

    /// All objects sharing `basename`, across categories.
    pub fn entries(&self, basename: &str) -> &[ArchiveObject] {
        self.by_basename
            .get(basename)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_duplicate(&self, basename: &str) -> bool {
        self.entries(basename).len() > 1
    }

    pub fn duplicates(&self) -> BTreeSet<&str> {
        self.by_basename
            .iter()
            .filter(|(_, entries)| entries.len() > 1)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn basenames(&self) -> impl Iterator<Item = &str> {
        self.by_basename.keys().map(String::as_str)
    }

    pub fn basename_count(&self) -> usize {
        self.by_basename.len()
    }

    pub fn object_count(&self) -> usize {
        self.by_basename.values().map(Vec::len).sum()
    }
}

impl FromIterator<ArchiveObject> for Inventory {
    fn from_iter<I: IntoIterator<Item = ArchiveObject>>(iter: I) -> Self {
        let mut inventory = Inventory::default();
        for object in iter {
            inventory.insert(object);
        }
        inventory
    }
}
