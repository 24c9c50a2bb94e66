use crate::errors::{ReconcileError, ReconcileResult};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

/// Prefix under which archive objects live in the bucket.
pub const ARCHIVE_PREFIX: &str = "archive/";
/// Prefix under which persisted reconcile reports are written.
pub const RECONCILE_LOG_PREFIX: &str = "logs/archive_reconcile/";

const DEFAULT_BUCKET: &str = "svr_object_storage";
const DEFAULT_TABLE: &str = "archives_index";
const DEFAULT_IO_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_CONCURRENCY: usize = 8;
const MAX_TABLE_NAME_LEN: usize = 128;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub storage_dir: PathBuf,
    pub bucket: String,
    pub table: String,
    pub io_timeout: Duration,
    pub max_retries: u32,
    pub concurrency: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Reconcile the archive index with the object store")]
pub struct Args {
    /// Index database URL (overrides ARCHIVE_RECONCILE_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Root directory holding bucket directories (overrides ARCHIVE_RECONCILE_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Bucket name (overrides ARCHIVE_RECONCILE_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Index table name (overrides ARCHIVE_RECONCILE_TABLE)
    #[arg(long, global = true)]
    pub table: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Cross-check the index against the archive objects and correct drift
    Reconcile(ReconcileOptions),
    /// Create the index table if it does not exist, then exit
    Migrate,
    /// Verify that both stores are reachable, then exit
    Check,
}

/// Flags that parameterize a single reconciliation run.
#[derive(ClapArgs, Debug, Clone)]
pub struct ReconcileOptions {
    /// Show actions without applying changes
    #[arg(long)]
    pub dry_run: bool,

    /// Soft-delete reason to set when an archive is missing from the store
    #[arg(long, default_value = "reconcile-missing")]
    pub reason: String,

    /// Actor label for updates
    #[arg(long, default_value = "reconcile-cli")]
    pub who: String,

    /// Also analyze soft-deleted rows (report-only unless combined with --reactivate-deleted)
    #[arg(long)]
    pub include_deleted: bool,

    /// Reactivate soft-deleted rows whose archive exists. Implies --include-deleted
    #[arg(long)]
    pub reactivate_deleted: bool,

    /// Persist the JSON report under logs/archive_reconcile/
    #[arg(long)]
    pub upload_log: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            reason: "reconcile-missing".into(),
            who: "reconcile-cli".into(),
            include_deleted: false,
            reactivate_deleted: false,
            upload_log: false,
        }
    }
}

impl ReconcileOptions {
    /// Reactivation only makes sense when soft-deleted rows are examined.
    pub fn normalized(mut self) -> Self {
        if self.reactivate_deleted {
            self.include_deleted = true;
        }
        self
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the subcommand.
    pub fn from_env_and_args() -> ReconcileResult<(Self, Command)> {
        let args = Args::parse();
        let command = args.command.clone();
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, command))
    }

    /// Merge CLI args over values read through `lookup` and validate the result.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> ReconcileResult<Self> {
        let database_url = args
            .database_url
            .or_else(|| lookup("ARCHIVE_RECONCILE_DATABASE_URL"))
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ReconcileError::config(
                    "missing index database URL (ARCHIVE_RECONCILE_DATABASE_URL or --database-url)",
                )
            })?;
        let storage_dir = args
            .storage_dir
            .or_else(|| lookup("ARCHIVE_RECONCILE_STORAGE_DIR").map(PathBuf::from))
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                ReconcileError::config(
                    "missing storage directory (ARCHIVE_RECONCILE_STORAGE_DIR or --storage-dir)",
                )
            })?;
        let bucket = args
            .bucket
            .or_else(|| lookup("ARCHIVE_RECONCILE_BUCKET"))
            .unwrap_or_else(|| DEFAULT_BUCKET.into());
        let table = args
            .table
            .or_else(|| lookup("ARCHIVE_RECONCILE_TABLE"))
            .unwrap_or_else(|| DEFAULT_TABLE.into());

        let io_timeout_secs = parse_env(
            &lookup,
            "ARCHIVE_RECONCILE_IO_TIMEOUT_SECS",
            DEFAULT_IO_TIMEOUT_SECS,
        )?;
        let max_retries = parse_env(&lookup, "ARCHIVE_RECONCILE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let concurrency = parse_env(&lookup, "ARCHIVE_RECONCILE_CONCURRENCY", DEFAULT_CONCURRENCY)?;

        let cfg = Self {
            database_url,
            storage_dir,
            bucket,
            table,
            io_timeout: Duration::from_secs(io_timeout_secs),
            max_retries,
            concurrency,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> ReconcileResult<()> {
        ensure_identifier(&self.table)?;
        if self.bucket.is_empty() || self.bucket.contains('/') || self.bucket.contains("..") {
            return Err(ReconcileError::config(format!(
                "bucket `{}` must be a single non-empty path segment",
                self.bucket
            )));
        }
        if self.concurrency == 0 {
            return Err(ReconcileError::config("concurrency must be at least 1"));
        }
        if u32::try_from(self.concurrency).is_err() {
            return Err(ReconcileError::config(format!(
                "concurrency {} exceeds the connection pool limit of {}",
                self.concurrency,
                u32::MAX
            )));
        }
        if self.io_timeout.is_zero() {
            return Err(ReconcileError::config("I/O timeout must be at least one second"));
        }
        Ok(())
    }

    /// Fully qualified locator for an object key, as stored in the index.
    pub fn object_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }

    /// Decode a stored locator back into an object key within this bucket.
    ///
    /// Locators pointing at another bucket (or malformed ones) decode to `None`.
    pub fn key_from_uri<'a>(&self, uri: &'a str) -> Option<&'a str> {
        uri.strip_prefix("gs://")?
            .strip_prefix(self.bucket.as_str())?
            .strip_prefix('/')
            .filter(|key| !key.is_empty())
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> ReconcileResult<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| ReconcileError::config(format!("parsing {key} value `{value}`: {err}"))),
        None => Ok(default),
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn ensure_identifier(name: &str) -> ReconcileResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_TABLE_NAME_LEN
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ReconcileError::config(format!(
            "table name `{name}` must be an identifier of letters, digits and underscores"
        )))
    }
}

#[cfg(test)]
impl AppConfig {
    /// Configuration pointing at fakes; used by component tests.
    pub fn for_tests(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            storage_dir: storage_dir.into(),
            bucket: "test-bucket".into(),
            table: DEFAULT_TABLE.into(),
            io_timeout: Duration::from_secs(5),
            max_retries: 2,
            concurrency: 4,
        }
    }
}
