//! Structured document describing one reconciliation run.

use super::action::PlannedMutation;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of untracked basenames listed in the details section.
pub const UNTRACKED_DETAIL_CAP: usize = 200;

#[derive(Clone, Debug, Serialize)]
pub struct ReconcileReport {
    pub event: &'static str,
    pub bucket: String,
    pub ts: DateTime<Utc>,
    pub dry_run: bool,
    pub summary: ReportSummary,
    pub details: ReportDetails,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<PlannedMutation>,
}

/// Counts per category. Detail lists are deduplicated, so these match
/// their lengths except for `untracked_in_bq`, which counts past the cap.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub bq_active_rows: usize,
    pub gcs_basenames: usize,
    pub missing_in_gcs: usize,
    pub ambiguous_in_gcs: usize,
    pub fixed_exists_flag: usize,
    pub fixed_wrong_uri: usize,
    pub untracked_in_bq: usize,
    pub deleted_but_exists: usize,
    pub reactivated: usize,
}

/// Sorted, deduplicated basenames per category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportDetails {
    pub missing_in_gcs: Vec<String>,
    pub ambiguous_in_gcs: Vec<String>,
    pub fixed_exists_flag: Vec<String>,
    pub fixed_wrong_uri: Vec<String>,
    pub untracked_in_bq: Vec<String>,
    pub deleted_but_exists: Vec<String>,
    pub reactivated: Vec<String>,
}

/// A row the run could not examine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub zip_name: String,
    pub note: String,
}

impl ReconcileReport {
    /// Sum of all counts that correspond to index writes.
    pub fn mutation_count(&self) -> usize {
        let s = &self.summary;
        s.missing_in_gcs + s.fixed_exists_flag + s.fixed_wrong_uri + s.reactivated
    }
}
