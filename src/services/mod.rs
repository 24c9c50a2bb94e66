//! Reconciliation services: store access, the lister/resolver/driver
//! pipeline, mutation dispatch and reporting.

pub mod applier;
pub mod index_store;
pub mod inventory;
pub mod object_store;
pub mod preflight;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod retry;

#[cfg(test)]
pub mod mock;
