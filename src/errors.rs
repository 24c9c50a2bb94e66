//! Error taxonomy for a reconciliation run.
//!
//! Ambiguity and precondition-guard misses are not errors: the
//! first is a report classification, the second is an `Ok(0)` from the
//! index store.

use std::{io, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Missing or malformed configuration. Raised before any store is read.
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Index(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] io::Error),
    #[error("`{op}` timed out after {after:?}")]
    Timeout { op: String, after: Duration },
    #[error("`{op}` failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        op: String,
        attempts: u32,
        #[source]
        source: Box<ReconcileError>,
    },
    #[error("report encoding failed: {0}")]
    Report(#[from] serde_json::Error),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

impl ReconcileError {
    /// Shortcut for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` if retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Store(err) => is_transient_io(err),
            Self::Index(err) => matches!(
                err,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            ),
            Self::Config(_) | Self::RetriesExhausted { .. } | Self::Report(_) => false,
        }
    }
}

fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
