use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{path::Path, str::FromStr, sync::Arc};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

use config::{AppConfig, Command, ReconcileOptions};
use services::{
    index_store::SqliteIndexStore, object_store::FsObjectStore, preflight,
    reconciler::Reconciler, report, retry::RetryPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config; nothing is read before this succeeds ---
    let (cfg, command) = AppConfig::from_env_and_args().context("loading configuration")?;
    tracing::info!("Starting archive-reconcile with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    prepare_sqlite_path(&cfg.database_url)?;
    let connect_opts = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database url {}", cfg.database_url))?
        .create_if_missing(true);
    let pool_size = u32::try_from(cfg.concurrency).context("sizing connection pool")?;
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(cfg.io_timeout)
            .connect_with(connect_opts)
            .await
            .with_context(|| format!("connecting to index database {}", cfg.database_url))?,
    );
    let index = Arc::new(SqliteIndexStore::new(db, &cfg));
    let store = Arc::new(FsObjectStore::new(&cfg));

    match command {
        Command::Migrate => {
            index.migrate().await.context("running index migration")?;
            tracing::info!("Index migration complete.");
        }
        Command::Check => {
            let result = preflight::run(&index, &store).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_ok() {
                anyhow::bail!("preflight checks failed");
            }
        }
        Command::Reconcile(opts) => reconcile(cfg, index, store, opts).await?,
    }

    Ok(())
}

async fn reconcile(
    cfg: AppConfig,
    index: Arc<SqliteIndexStore>,
    store: Arc<FsObjectStore>,
    opts: ReconcileOptions,
) -> Result<()> {
    let policy = RetryPolicy::from_config(&cfg);
    let reconciler = Reconciler::new(cfg, store.clone(), index);
    let report = reconciler.run(&opts).await.context("reconciliation run")?;

    // The report always goes to stdout; logs go to stderr.
    println!("{}", report::render(&report)?);

    if opts.upload_log {
        let key = report::persist(store.as_ref(), policy, &report)
            .await
            .context("persisting reconcile report")?;
        tracing::info!("Report stored at {}", key);
    }
    Ok(())
}

/// Make sure the directory holding a file-backed SQLite database exists.
fn prepare_sqlite_path(db_url: &str) -> Result<()> {
    if db_url.contains(":memory:") {
        return Ok(());
    }
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    let db_path_obj = Path::new(db_path);
    if let Some(parent) = db_path_obj.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {:?}", parent))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}
