//! Core data models for the reconciliation engine.
//!
//! These types describe the two snapshots a run works from (objects in the
//! store, rows in the index), the per-row classification, the corrective
//! mutations and the final report. Index rows map to the SQLite table via
//! `sqlx::FromRow`; reports and planned mutations serialize as JSON via
//! `serde`.

pub mod action;
pub mod archive;
pub mod matching;
pub mod record;
pub mod report;
