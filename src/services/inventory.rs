//! Storage inventory lister.
//!
//! Enumerates everything under `archive/` and groups it by basename. Keys
//! look like `archive/<category>/<basename>` or, for unpartitioned objects,
//! `archive/<basename>`.

use crate::{
    config::ARCHIVE_PREFIX,
    errors::ReconcileResult,
    models::archive::{ArchiveObject, Inventory, StoredObject},
    services::{
        object_store::ObjectStore,
        retry::{RetryPolicy, with_retry},
    },
};
use std::sync::Arc;
use tracing::{debug, info};

/// Categories the upload path writes to. Others are listed all the same.
pub const KNOWN_CATEGORIES: [&str; 4] = ["public", "simulated", "real", "youtube"];

pub struct InventoryLister {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl InventoryLister {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Take one snapshot of the archive namespace.
    pub async fn snapshot(&self) -> ReconcileResult<Inventory> {
        let listed = with_retry(self.policy, "list archive objects", || {
            self.store.list(ARCHIVE_PREFIX)
        })
        .await?;
        let total = listed.len();
        let inventory: Inventory = listed.into_iter().filter_map(to_archive_object).collect();

        let duplicates = inventory.duplicates();
        info!(
            listed = total,
            objects = inventory.object_count(),
            basenames = inventory.basename_count(),
            duplicates = duplicates.len(),
            "archive inventory listed"
        );
        for name in duplicates {
            debug!("duplicate basename {} across categories", name);
        }
        Ok(inventory)
    }
}

/// Classify one listed entry; markers and non-archive keys yield `None`.
pub fn to_archive_object(stored: StoredObject) -> Option<ArchiveObject> {
    if stored.is_marker || stored.path.ends_with('/') {
        return None;
    }
    let rel = stored.path.strip_prefix(ARCHIVE_PREFIX)?;
    let (category, basename) = match rel.split_once('/') {
        Some((category, basename)) => (category.to_string(), basename.to_string()),
        None => (String::new(), rel.to_string()),
    };
    if basename.is_empty() {
        return None;
    }
    if !category.is_empty() && !KNOWN_CATEGORIES.contains(&category.as_str()) {
        debug!("object {} is under unknown category `{}`", stored.path, category);
    }
    let generation = parse_generation(stored.generation.as_deref());
    Some(ArchiveObject {
        generation,
        path: stored.path,
        basename,
        category,
    })
}

/// Unparseable tokens become `None` rather than failing the listing.
pub fn parse_generation(token: Option<&str>) -> Option<i64> {
    let token = token?.trim();
    match token.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!("ignoring unparseable generation token `{}`", token);
            None
        }
    }
}
