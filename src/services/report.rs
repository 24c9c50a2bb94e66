//! Report builder and sink.

use crate::{
    config::RECONCILE_LOG_PREFIX,
    errors::ReconcileResult,
    models::{
        action::{PlannedMutation, ReconcileAction},
        report::{ReconcileReport, ReportDetails, ReportSummary, UNTRACKED_DETAIL_CAP},
    },
    services::{
        object_store::ObjectStore,
        reconciler::Plan,
        retry::{RetryPolicy, with_retry},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub struct ReportBuilder {
    bucket: String,
    dry_run: bool,
    ts: DateTime<Utc>,
    active_rows: usize,
    basenames: usize,
}

impl ReportBuilder {
    pub fn new(bucket: &str, dry_run: bool) -> Self {
        Self {
            bucket: bucket.to_string(),
            dry_run,
            ts: Utc::now(),
            active_rows: 0,
            basenames: 0,
        }
    }

    pub fn active_rows(mut self, n: usize) -> Self {
        self.active_rows = n;
        self
    }

    pub fn basenames(mut self, n: usize) -> Self {
        self.basenames = n;
        self
    }

    pub fn build(self, plan: Plan, planned: Vec<PlannedMutation>) -> ReconcileReport {
        let mut missing = BTreeSet::new();
        let mut ambiguous = BTreeSet::new();
        let mut fixed_exists = BTreeSet::new();
        let mut fixed_uri = BTreeSet::new();
        let mut deleted_but_exists = BTreeSet::new();
        let mut reactivated = BTreeSet::new();

        for decision in plan.decisions {
            let list = match decision.action {
                ReconcileAction::SoftDelete => &mut missing,
                ReconcileAction::FixExistsFlag { .. } => &mut fixed_exists,
                ReconcileAction::FixUri { .. } => &mut fixed_uri,
                ReconcileAction::Reactivate { .. } => &mut reactivated,
                ReconcileAction::ReportAmbiguous => &mut ambiguous,
                ReconcileAction::ReportDeletedButExists => &mut deleted_but_exists,
            };
            list.insert(decision.zip_name);
        }

        let untracked: BTreeSet<String> = plan.untracked.into_iter().collect();
        let summary = ReportSummary {
            bq_active_rows: self.active_rows,
            gcs_basenames: self.basenames,
            missing_in_gcs: missing.len(),
            ambiguous_in_gcs: ambiguous.len(),
            fixed_exists_flag: fixed_exists.len(),
            fixed_wrong_uri: fixed_uri.len(),
            untracked_in_bq: untracked.len(),
            deleted_but_exists: deleted_but_exists.len(),
            reactivated: reactivated.len(),
        };
        let details = ReportDetails {
            missing_in_gcs: missing.into_iter().collect(),
            ambiguous_in_gcs: ambiguous.into_iter().collect(),
            fixed_exists_flag: fixed_exists.into_iter().collect(),
            fixed_wrong_uri: fixed_uri.into_iter().collect(),
            untracked_in_bq: untracked.into_iter().take(UNTRACKED_DETAIL_CAP).collect(),
            deleted_but_exists: deleted_but_exists.into_iter().collect(),
            reactivated: reactivated.into_iter().collect(),
        };

        ReconcileReport {
            event: "reconcile",
            bucket: self.bucket,
            ts: self.ts,
            dry_run: self.dry_run,
            summary,
            details,
            skipped: plan.skipped,
            planned,
        }
    }
}

/// Pretty JSON rendering, as printed and persisted.
pub fn render(report: &ReconcileReport) -> ReconcileResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Object key for a report, derived from its timestamp.
pub fn report_key(report: &ReconcileReport) -> String {
    format!(
        "{}reconcile_{}.json",
        RECONCILE_LOG_PREFIX,
        report.ts.format("%Y%m%dT%H%M%S%.6fZ")
    )
}

/// Write the report to the object store and return its key.
pub async fn persist(
    store: &dyn ObjectStore,
    policy: RetryPolicy,
    report: &ReconcileReport,
) -> ReconcileResult<String> {
    let key = report_key(report);
    let body = Bytes::from(render(report)?);
    with_retry(policy, "upload reconcile report", || store.put(&key, body.clone())).await?;
    tracing::info!("Reconcile report uploaded: gs://{}/{}", store.bucket(), key);
    Ok(key)
}
