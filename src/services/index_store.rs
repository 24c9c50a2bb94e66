//! Archive index access.
//!
//! Reads return whole snapshots of active or soft-deleted rows. Writes are
//! guarded: each mutation is a single `UPDATE ... WHERE <precondition>`, so
//! a row that somebody else already corrected is left untouched and the
//! call reports zero affected rows instead of failing.

use crate::{
    config::AppConfig,
    errors::ReconcileResult,
    models::{
        action::{Mutation, Precondition},
        record::IndexRecord,
    },
};
use async_trait::async_trait;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::debug;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Rows whose `is_deleted` is false or unknown.
    async fn list_active(&self) -> ReconcileResult<Vec<IndexRecord>>;

    /// Rows whose `is_deleted` is true.
    async fn list_deleted(&self) -> ReconcileResult<Vec<IndexRecord>>;

    /// Apply `mutation` to every row named `zip_name` still satisfying
    /// `precondition`. Returns the number of rows changed.
    async fn apply(
        &self,
        zip_name: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> ReconcileResult<u64>;
}

/// Index table stored in SQLite.
#[derive(Clone)]
pub struct SqliteIndexStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    /// Validated table identifier.
    table: String,
}

impl SqliteIndexStore {
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        Self {
            db,
            table: cfg.table.clone(),
        }
    }

    /// Create the index table and its lookup index if they do not exist.
    pub async fn migrate(&self) -> ReconcileResult<()> {
        let sql = MIGRATION_SQL.replace("{table}", &self.table);
        let statements = sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Cheap probe: the database answers and the index table exists.
    pub async fn ping(&self) -> ReconcileResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        let sql = format!("SELECT 1 FROM {} LIMIT 1", self.table);
        sqlx::query(&sql).fetch_optional(&*self.db).await?;
        Ok(())
    }

    async fn fetch_where(&self, deleted: bool) -> ReconcileResult<Vec<IndexRecord>> {
        let sql = format!(
            "SELECT COALESCE(zip_name, '') AS zip_name, gcs_uri, exists_in_gcs, is_deleted,
                    ts_deleted, delete_reason, deleted_by, gcs_generation_last
             FROM {}
             WHERE COALESCE(is_deleted, 0) = ?
             ORDER BY zip_name",
            self.table
        );
        let rows = sqlx::query_as::<_, IndexRecord>(&sql)
            .bind(deleted)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows)
    }

    /// Insert a row as the upload path would.
    #[cfg(test)]
    pub async fn insert(&self, record: &IndexRecord) -> ReconcileResult<()> {
        let sql = format!(
            "INSERT INTO {} (zip_name, gcs_uri, exists_in_gcs, is_deleted, ts_deleted,
                             delete_reason, deleted_by, gcs_generation_last)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.zip_name)
            .bind(&record.gcs_uri)
            .bind(record.exists_in_gcs)
            .bind(record.is_deleted)
            .bind(record.ts_deleted)
            .bind(&record.delete_reason)
            .bind(&record.deleted_by)
            .bind(record.gcs_generation_last)
            .execute(&*self.db)
            .await?;
        Ok(())
    }
}

fn push_guard(builder: &mut QueryBuilder<'_, Sqlite>, precondition: &Precondition) {
    match precondition {
        Precondition::Active => {
            builder.push(" AND COALESCE(is_deleted, 0) = 0");
        }
        Precondition::Deleted => {
            builder.push(" AND COALESCE(is_deleted, 0) = 1");
        }
        Precondition::ActiveAndStale { uri } => {
            builder.push(
                " AND COALESCE(is_deleted, 0) = 0 \
                 AND (exists_in_gcs IS NULL OR exists_in_gcs = 0 OR gcs_uri IS NOT ",
            );
            builder.push_bind(uri.clone());
            builder.push(")");
        }
    }
}

fn push_assignments(builder: &mut QueryBuilder<'_, Sqlite>, mutation: &Mutation) {
    match mutation {
        Mutation::SoftDeleted(stamp) => {
            builder.push("is_deleted = 1, exists_in_gcs = 0, ts_deleted = ");
            builder.push_bind(stamp.at);
            builder.push(", delete_reason = ");
            builder.push_bind(stamp.reason.clone());
            builder.push(", deleted_by = ");
            builder.push_bind(stamp.actor.clone());
        }
        Mutation::Exists { generation, uri } => {
            builder.push("exists_in_gcs = 1, gcs_generation_last = ");
            builder.push_bind(*generation);
            builder.push(", gcs_uri = ");
            builder.push_bind(uri.clone());
        }
        Mutation::Reactivated { generation, uri } => {
            builder.push(
                "is_deleted = 0, ts_deleted = NULL, delete_reason = NULL, deleted_by = NULL, \
                 exists_in_gcs = 1, gcs_generation_last = ",
            );
            builder.push_bind(*generation);
            builder.push(", gcs_uri = ");
            builder.push_bind(uri.clone());
        }
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn list_active(&self) -> ReconcileResult<Vec<IndexRecord>> {
        self.fetch_where(false).await
    }

    async fn list_deleted(&self) -> ReconcileResult<Vec<IndexRecord>> {
        self.fetch_where(true).await
    }

    async fn apply(
        &self,
        zip_name: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> ReconcileResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", self.table));
        push_assignments(&mut builder, mutation);
        builder.push(" WHERE zip_name = ");
        builder.push_bind(zip_name.to_string());
        push_guard(&mut builder, precondition);

        let result = builder.build().execute(&*self.db).await?;
        Ok(result.rows_affected())
    }
}
