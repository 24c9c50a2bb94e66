//! Match resolver: pins an index row to a physical object, if it can.

use crate::{
    config::AppConfig,
    models::{archive::Inventory, matching::MatchResult, record::IndexRecord},
};

/// Resolve `record` against `inventory`, in strict priority order:
///
/// 1. the stored locator names an object listed under this basename;
/// 2. exactly one object has this basename;
/// 3. no object has this basename;
/// 4. several do, and none is pinned by the locator.
///
/// Duplicate short-circuiting is the driver's concern; this function still
/// lets an exact locator win among duplicates.
pub fn resolve(cfg: &AppConfig, record: &IndexRecord, inventory: &Inventory) -> MatchResult {
    let entries = inventory.entries(&record.zip_name);

    if let Some(key) = record.gcs_uri.as_deref().and_then(|uri| cfg.key_from_uri(uri)) {
        if let Some(hit) = entries.iter().find(|obj| obj.path == key) {
            return MatchResult::ExactUri {
                path: hit.path.clone(),
                generation: hit.generation,
            };
        }
    }

    match entries {
        [only] => MatchResult::UniqueBasename {
            path: only.path.clone(),
            generation: only.generation,
        },
        [] => MatchResult::NotFound,
        many => MatchResult::Ambiguous {
            candidates: many.len(),
        },
    }
}
