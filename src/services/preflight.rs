//! Preflight checks.
//!
//! - index: a lightweight `SELECT 1`, then a one-row read of the index table
//! - store: a write/read/delete probe under the bucket root

use crate::services::{index_store::SqliteIndexStore, object_store::FsObjectStore};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct PreflightReport {
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub ok: bool,
    pub error: Option<String>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.checks.values().all(|c| c.ok)
    }
}

/// Probe both stores. Never fails; failures are reported per check.
pub async fn run(index: &SqliteIndexStore, store: &FsObjectStore) -> PreflightReport {
    let index_check = match index.ping().await {
        Ok(()) => CheckStatus { ok: true, error: None },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(format!("error: {}", e)),
        },
    };

    let store_check = probe_store(store).await;

    let mut checks = BTreeMap::new();
    checks.insert("index", index_check);
    checks.insert("store", store_check);
    let status = if checks.values().all(|c| c.ok) { "ok" } else { "error" };
    PreflightReport { status, checks }
}

async fn probe_store(store: &FsObjectStore) -> CheckStatus {
    if let Err(e) = fs::create_dir_all(store.root()).await {
        return CheckStatus {
            ok: false,
            error: Some(format!("could not create bucket root: {}", e)),
        };
    }
    let tmp_path = store.root().join(format!(".tmp-preflight-{}", Uuid::new_v4()));
    let (ok, error) = match fs::write(&tmp_path, b"preflight").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"preflight" => match fs::remove_file(&tmp_path).await {
                Ok(_) => (true, None),
                Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
            },
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some("file content mismatch".to_string()))
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some(format!("could not read tmp file: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
    };
    CheckStatus { ok, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::{index_store::tests::memory_index, object_store::ObjectStore},
    };
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    #[tokio::test]
    async fn healthy_stores_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let index = memory_index().await;
        let store = FsObjectStore::new(&AppConfig::for_tests(tmp.path()));

        let report = run(&index, &store).await;
        assert!(report.is_ok(), "{report:?}");
        assert_eq!(report.status, "ok");
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_index_fails_its_check() {
        let tmp = tempfile::tempdir().unwrap();
        let index = memory_index().await;
        index.db.close().await;
        let store = FsObjectStore::new(&AppConfig::for_tests(tmp.path()));

        let report = run(&index, &store).await;
        assert!(!report.is_ok());
        assert!(!report.checks["index"].ok);
        assert!(report.checks["store"].ok);
    }

    #[tokio::test]
    async fn missing_index_table_fails_its_check() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = AppConfig::for_tests(tmp.path());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let index = SqliteIndexStore::new(Arc::new(pool), &cfg);
        let store = FsObjectStore::new(&cfg);

        let report = run(&index, &store).await;
        assert_eq!(report.status, "error");
        assert!(!report.checks["index"].ok);
        assert!(report.checks["index"].error.is_some());

        index.migrate().await.unwrap();
        assert!(run(&index, &store).await.is_ok());
    }
}
