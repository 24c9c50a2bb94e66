//! Corrective actions and the guarded index mutations that implement them.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A decided step for one index row.
///
/// Derived deterministically from the row's state and its match result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Row says active but the object is gone.
    SoftDelete,
    /// Row under-reports presence of an object that resolves.
    FixExistsFlag { generation: Option<i64>, uri: String },
    /// Row claims presence but its locator is stale.
    FixUri { generation: Option<i64>, uri: String },
    /// Row is soft-deleted but its object is present again (opt-in only).
    Reactivate { generation: Option<i64>, uri: String },
    /// Duplicate basename or multi-candidate match; never mutated.
    ReportAmbiguous,
    /// Row is soft-deleted, object is present, reactivation not enabled.
    ReportDeletedButExists,
}

/// Who/why stamp applied by a soft delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteStamp {
    pub reason: String,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// State the row must still be in for a mutation to take effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Precondition {
    /// `is_deleted` is false or unknown.
    Active,
    /// `is_deleted` is true.
    Deleted,
    /// Active, and either the presence flag is not true or the locator differs.
    ActiveAndStale { uri: String },
}

/// State change written to the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "set", rename_all = "snake_case")]
pub enum Mutation {
    /// Mark soft-deleted, clear the presence flag, stamp the audit fields.
    SoftDeleted(DeleteStamp),
    /// Mark present and record the resolved locator and generation.
    Exists { generation: Option<i64>, uri: String },
    /// Clear the audit fields, mark active and present.
    Reactivated { generation: Option<i64>, uri: String },
}

impl ReconcileAction {
    /// Whether this action writes to the index at all.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::ReportAmbiguous | Self::ReportDeletedButExists)
    }

    /// The guarded transition implementing this action, if it mutates.
    pub fn transition(&self, stamp: &DeleteStamp) -> Option<(Precondition, Mutation)> {
        match self {
            Self::SoftDelete => Some((Precondition::Active, Mutation::SoftDeleted(stamp.clone()))),
            Self::FixExistsFlag { generation, uri } | Self::FixUri { generation, uri } => Some((
                Precondition::ActiveAndStale { uri: uri.clone() },
                Mutation::Exists {
                    generation: *generation,
                    uri: uri.clone(),
                },
            )),
            Self::Reactivate { generation, uri } => Some((
                Precondition::Deleted,
                Mutation::Reactivated {
                    generation: *generation,
                    uri: uri.clone(),
                },
            )),
            Self::ReportAmbiguous | Self::ReportDeletedButExists => None,
        }
    }
}

/// One action decided for one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub zip_name: String,
    pub action: ReconcileAction,
}

/// A mutation that dry-run mode declined to write, kept verbatim for the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannedMutation {
    pub zip_name: String,
    pub precondition: Precondition,
    pub mutation: Mutation,
}
