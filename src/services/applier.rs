//! Mutation applier.
//!
//! Writes guarded transitions to the index, or in dry-run mode records
//! them verbatim without touching the index.

use crate::{
    errors::ReconcileResult,
    models::action::{Mutation, PlannedMutation, Precondition},
    services::{
        index_store::IndexStore,
        retry::{RetryPolicy, with_retry},
    },
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The guard held and this many rows changed.
    Applied(u64),
    /// The guard no longer held; somebody already corrected the row.
    AlreadyConsistent,
    /// Dry run: recorded, not written.
    Planned,
}

pub struct MutationApplier {
    index: Arc<dyn IndexStore>,
    policy: RetryPolicy,
    dry_run: bool,
    planned: Mutex<Vec<PlannedMutation>>,
}

impl MutationApplier {
    pub fn new(index: Arc<dyn IndexStore>, policy: RetryPolicy, dry_run: bool) -> Self {
        Self {
            index,
            policy,
            dry_run,
            planned: Mutex::new(Vec::new()),
        }
    }

    pub async fn apply(
        &self,
        zip_name: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> ReconcileResult<ApplyOutcome> {
        if self.dry_run {
            info!("[DRY-RUN] {} {:?} when {:?}", zip_name, mutation, precondition);
            self.planned
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(PlannedMutation {
                    zip_name: zip_name.to_string(),
                    precondition: precondition.clone(),
                    mutation: mutation.clone(),
                });
            return Ok(ApplyOutcome::Planned);
        }

        let op = format!("{} {}", mutation_label(mutation), zip_name);
        let affected = with_retry(self.policy, &op, || {
            self.index.apply(zip_name, precondition, mutation)
        })
        .await?;

        if affected == 0 {
            debug!("{}: precondition no longer holds, nothing changed", op);
            Ok(ApplyOutcome::AlreadyConsistent)
        } else {
            info!("{}: updated {} row(s)", op, affected);
            Ok(ApplyOutcome::Applied(affected))
        }
    }

    /// Drain the mutations recorded so far in dry-run mode.
    pub fn take_planned(&self) -> Vec<PlannedMutation> {
        std::mem::take(&mut *self.planned.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn mutation_label(mutation: &Mutation) -> &'static str {
    match mutation {
        Mutation::SoftDeleted(_) => "soft-delete",
        Mutation::Exists { .. } => "mark-exists",
        Mutation::Reactivated { .. } => "reactivate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::{
            index_store::tests::{active, memory_index},
            mock::CountingIndex,
        },
    };
    use std::sync::atomic::Ordering;

    fn exists(uri: &str) -> (Precondition, Mutation) {
        (
            Precondition::ActiveAndStale { uri: uri.into() },
            Mutation::Exists {
                generation: Some(5),
                uri: uri.into(),
            },
        )
    }

    #[tokio::test]
    async fn dry_run_records_without_writing() {
        let index = memory_index().await;
        index.insert(&active("A.zip", None, Some(false))).await.unwrap();
        let counting = Arc::new(CountingIndex::new(index.clone()));
        let policy = RetryPolicy::from_config(&AppConfig::for_tests("/tmp"));
        let applier = MutationApplier::new(counting.clone(), policy, true);

        let (guard, mutation) = exists("gs://test-bucket/archive/public/A.zip");
        let outcome = applier.apply("A.zip", &guard, &mutation).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Planned);
        assert_eq!(counting.apply_calls(), 0);
        let planned = applier.take_planned();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].mutation, mutation);
        assert_eq!(index.list_active().await.unwrap()[0].exists_in_gcs, Some(false));
    }

    #[tokio::test]
    async fn guard_miss_is_not_an_error() {
        let index = memory_index().await;
        let uri = "gs://test-bucket/archive/public/A.zip";
        index.insert(&active("A.zip", Some(uri), Some(true))).await.unwrap();
        let policy = RetryPolicy::from_config(&AppConfig::for_tests("/tmp"));
        let applier = MutationApplier::new(Arc::new(index), policy, false);

        let (guard, mutation) = exists(uri);
        let outcome = applier.apply("A.zip", &guard, &mutation).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::AlreadyConsistent);
    }

    #[tokio::test]
    async fn transient_write_failures_are_retried() {
        let index = memory_index().await;
        index.insert(&active("A.zip", None, None)).await.unwrap();
        let counting = Arc::new(CountingIndex::new(index));
        counting.failing_applies.store(1, Ordering::SeqCst);
        let policy = RetryPolicy::from_config(&AppConfig::for_tests("/tmp"));
        let applier = MutationApplier::new(counting.clone(), policy, false);

        let (guard, mutation) = exists("gs://test-bucket/archive/public/A.zip");
        let outcome = applier.apply("A.zip", &guard, &mutation).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(1));
        assert_eq!(counting.apply_calls(), 2);
    }
}
