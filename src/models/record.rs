//! Represents one row of the archive index.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Authoritative metadata for one logical archive.
///
/// Rows are created by the upload path and never physically removed; the
/// soft-delete audit fields are set together and cleared together.
#[derive(Clone, FromRow, Debug, PartialEq)]
pub struct IndexRecord {
    /// Logical basename; the join key against the inventory.
    pub zip_name: String,

    /// Last-known fully qualified locator (`gs://bucket/key`).
    pub gcs_uri: Option<String>,

    /// Cached belief about object presence. `None` means unknown.
    pub exists_in_gcs: Option<bool>,

    /// Soft-delete flag. `None` is treated as active.
    pub is_deleted: Option<bool>,

    /// When the row was soft-deleted.
    pub ts_deleted: Option<DateTime<Utc>>,

    /// Why the row was soft-deleted.
    pub delete_reason: Option<String>,

    /// Who soft-deleted the row.
    pub deleted_by: Option<String>,

    /// Last observed object generation.
    pub gcs_generation_last: Option<i64>,
}

impl IndexRecord {
    pub fn is_active(&self) -> bool {
        !self.is_deleted.unwrap_or(false)
    }

    /// Whether the row already claims the object is present.
    pub fn claims_present(&self) -> bool {
        self.exists_in_gcs == Some(true)
    }

    /// Returns the reason this row cannot be reconciled, if any.
    ///
    /// Without a usable `zip_name` there is nothing to join on.
    pub fn unusable_reason(&self) -> Option<&'static str> {
        if self.zip_name.trim().is_empty() {
            Some("empty zip_name")
        } else if self.zip_name.ends_with('/') {
            Some("zip_name names a directory, not an archive")
        } else {
            None
        }
    }
}
