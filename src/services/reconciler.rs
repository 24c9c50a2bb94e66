//! Reconciliation driver.
//!
//! One run reads both snapshots once, decides an action per index row from
//! those snapshots alone, then dispatches the mutating actions through the
//! applier. Anything that changed in either store after the snapshots were
//! taken is left for the next run; every write is guarded, so repeated runs
//! converge.

use crate::{
    config::{AppConfig, ReconcileOptions},
    errors::{ReconcileError, ReconcileResult},
    models::{
        action::{Decision, DeleteStamp, ReconcileAction},
        archive::Inventory,
        matching::MatchResult,
        record::IndexRecord,
        report::{ReconcileReport, SkippedRecord},
    },
    services::{
        applier::{ApplyOutcome, MutationApplier},
        index_store::IndexStore,
        inventory::InventoryLister,
        object_store::ObjectStore,
        report::ReportBuilder,
        resolver::resolve,
        retry::{RetryPolicy, with_retry},
    },
};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Everything decided from one pair of snapshots.
#[derive(Debug, Default)]
pub struct Plan {
    pub decisions: Vec<Decision>,
    pub skipped: Vec<SkippedRecord>,
    /// Inventory basenames with no active row, sorted.
    pub untracked: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DispatchTally {
    /// Rows changed, not decisions.
    applied: usize,
    already_consistent: usize,
    planned: usize,
}

pub struct Reconciler {
    cfg: AppConfig,
    lister: InventoryLister,
    index: Arc<dyn IndexStore>,
    policy: RetryPolicy,
}

impl Reconciler {
    pub fn new(cfg: AppConfig, store: Arc<dyn ObjectStore>, index: Arc<dyn IndexStore>) -> Self {
        let policy = RetryPolicy::from_config(&cfg);
        Self {
            lister: InventoryLister::new(store, policy),
            cfg,
            index,
            policy,
        }
    }

    /// Run one full reconciliation pass and return its report.
    pub async fn run(&self, opts: &ReconcileOptions) -> ReconcileResult<ReconcileReport> {
        let opts = opts.clone().normalized();
        info!(
            dry_run = opts.dry_run,
            include_deleted = opts.include_deleted,
            reactivate_deleted = opts.reactivate_deleted,
            "starting reconciliation"
        );

        let (inventory, active, deleted) = tokio::try_join!(
            self.lister.snapshot(),
            self.read_active(),
            self.read_deleted(opts.include_deleted),
        )?;
        info!(
            active_rows = active.len(),
            deleted_rows = deleted.len(),
            "index snapshot read"
        );

        let plan = plan(
            &self.cfg,
            &inventory,
            &active,
            opts.include_deleted.then_some(deleted.as_slice()),
            opts.reactivate_deleted,
        );

        let stamp = DeleteStamp {
            reason: opts.reason.clone(),
            actor: opts.who.clone(),
            at: Utc::now(),
        };
        let applier = MutationApplier::new(self.index.clone(), self.policy, opts.dry_run);
        let tally = dispatch(&applier, &plan.decisions, &stamp, self.cfg.concurrency).await?;
        info!(
            applied = tally.applied,
            already_consistent = tally.already_consistent,
            planned = tally.planned,
            "mutations dispatched"
        );

        let report = ReportBuilder::new(&self.cfg.bucket, opts.dry_run)
            .active_rows(active.len())
            .basenames(inventory.basename_count())
            .build(plan, applier.take_planned());
        info!(
            mutations = report.mutation_count(),
            dry_run = report.dry_run,
            "reconciliation finished"
        );
        Ok(report)
    }

    async fn read_active(&self) -> ReconcileResult<Vec<IndexRecord>> {
        with_retry(self.policy, "list active rows", || self.index.list_active()).await
    }

    async fn read_deleted(&self, wanted: bool) -> ReconcileResult<Vec<IndexRecord>> {
        if !wanted {
            return Ok(Vec::new());
        }
        with_retry(self.policy, "list deleted rows", || self.index.list_deleted()).await
    }
}

/// Decide the action for an active row, if it needs one.
pub fn decide_active(
    cfg: &AppConfig,
    record: &IndexRecord,
    inventory: &Inventory,
) -> Option<ReconcileAction> {
    // Two physical copies under one name is itself the anomaly; never pick one.
    if inventory.is_duplicate(&record.zip_name) {
        return Some(ReconcileAction::ReportAmbiguous);
    }

    let matched = resolve(cfg, record, inventory);
    debug!("{} resolved as {}", record.zip_name, matched.status());
    let Some((path, generation)) = matched.resolved() else {
        return Some(match &matched {
            MatchResult::NotFound => ReconcileAction::SoftDelete,
            _ => ReconcileAction::ReportAmbiguous,
        });
    };

    let uri = cfg.object_uri(path);
    if !record.claims_present() {
        Some(ReconcileAction::FixExistsFlag { generation, uri })
    } else if record.gcs_uri.as_deref().is_some_and(|stored| stored != uri) {
        // A present row with no stored locator is left as is.
        Some(ReconcileAction::FixUri { generation, uri })
    } else {
        None
    }
}

/// Decide the action for a soft-deleted row, if it needs one.
pub fn decide_deleted(
    cfg: &AppConfig,
    record: &IndexRecord,
    inventory: &Inventory,
    reactivate: bool,
) -> Option<ReconcileAction> {
    if inventory.is_duplicate(&record.zip_name) {
        return Some(ReconcileAction::ReportAmbiguous);
    }

    let matched = resolve(cfg, record, inventory);
    debug!("{} (deleted) resolved as {}", record.zip_name, matched.status());
    match matched {
        MatchResult::NotFound => None,
        MatchResult::Ambiguous { .. } => Some(ReconcileAction::ReportAmbiguous),
        MatchResult::ExactUri { path, generation }
        | MatchResult::UniqueBasename { path, generation } => Some(if reactivate {
            ReconcileAction::Reactivate {
                generation,
                uri: cfg.object_uri(&path),
            }
        } else {
            ReconcileAction::ReportDeletedButExists
        }),
    }
}

/// Fold both snapshots into a plan. Pure: no I/O, no clock.
///
/// `deleted` is `None` when soft-deleted rows were not requested.
pub fn plan(
    cfg: &AppConfig,
    inventory: &Inventory,
    active: &[IndexRecord],
    deleted: Option<&[IndexRecord]>,
    reactivate: bool,
) -> Plan {
    let mut plan = Plan::default();

    for record in active {
        if let Some(note) = record.unusable_reason() {
            warn!("skipping active row `{}`: {}", record.zip_name, note);
            plan.skipped.push(SkippedRecord {
                zip_name: record.zip_name.clone(),
                note: note.to_string(),
            });
            continue;
        }
        if let Some(action) = decide_active(cfg, record, inventory) {
            plan.decisions.push(Decision {
                zip_name: record.zip_name.clone(),
                action,
            });
        }
    }

    for record in deleted.unwrap_or_default() {
        if let Some(note) = record.unusable_reason() {
            warn!("skipping deleted row `{}`: {}", record.zip_name, note);
            plan.skipped.push(SkippedRecord {
                zip_name: record.zip_name.clone(),
                note: note.to_string(),
            });
            continue;
        }
        if let Some(action) = decide_deleted(cfg, record, inventory, reactivate) {
            plan.decisions.push(Decision {
                zip_name: record.zip_name.clone(),
                action,
            });
        }
    }

    let tracked: HashSet<&str> = active
        .iter()
        .filter(|r| r.is_active())
        .map(|r| r.zip_name.as_str())
        .collect();
    plan.untracked = inventory
        .basenames()
        .filter(|name| !tracked.contains(name))
        .map(str::to_string)
        .collect();

    plan
}

/// Dispatch the mutating decisions.
///
/// Decisions for the same `zip_name` run one after another; distinct names
/// run concurrently up to `concurrency`. The first hard failure aborts.
async fn dispatch(
    applier: &MutationApplier,
    decisions: &[Decision],
    stamp: &DeleteStamp,
    concurrency: usize,
) -> ReconcileResult<DispatchTally> {
    let mut groups: BTreeMap<&str, Vec<&ReconcileAction>> = BTreeMap::new();
    for decision in decisions.iter().filter(|d| d.action.is_mutating()) {
        groups
            .entry(decision.zip_name.as_str())
            .or_default()
            .push(&decision.action);
    }

    let outcomes: Vec<Vec<ApplyOutcome>> = stream::iter(groups)
        .map(|(zip_name, actions)| async move {
            let mut outcomes = Vec::with_capacity(actions.len());
            for action in actions {
                if let Some((precondition, mutation)) = action.transition(stamp) {
                    outcomes.push(applier.apply(zip_name, &precondition, &mutation).await?);
                }
            }
            Ok::<_, ReconcileError>(outcomes)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut tally = DispatchTally::default();
    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            ApplyOutcome::Applied(rows) => tally.applied += rows as usize,
            ApplyOutcome::AlreadyConsistent => tally.already_consistent += 1,
            ApplyOutcome::Planned => tally.planned += 1,
        }
    }
    Ok(tally)
}
