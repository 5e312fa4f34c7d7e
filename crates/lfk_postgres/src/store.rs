//! Postgres implementation of the cleanup store port.
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) because child
//! tables are only known once relation definitions are loaded. Each statement
//! runs in its own implicit transaction, so row locks taken by a pass are
//! released as soon as it completes.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use lfk_core::ports::{CleanupStore, Result};
use lfk_core::{DeletedRecord, LfkError, LockMode, RelationDefinition, RelationRegistry};

use crate::queries::{self, DELETED_RECORDS_TABLE};

/// Deleted-records log row as stored.
#[derive(Debug, Clone, FromRow)]
struct PgDeletedRecordRow {
    id: i64,
    fully_qualified_table_name: String,
    primary_key_value: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgDeletedRecordRow> for DeletedRecord {
    type Error = String;

    fn try_from(row: PgDeletedRecordRow) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            fully_qualified_table_name: row.fully_qualified_table_name,
            primary_key_value: row.primary_key_value,
            status: row.status.try_into()?,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed cleanup store.
#[derive(Debug, Clone)]
pub struct PgCleanupStore {
    pool: PgPool,
}

impl PgCleanupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled migrations (deleted-records log and its trigger function).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LfkError::Storage(anyhow!(e)))
    }

    /// Check that every child table, foreign-key column and primary key named
    /// by the registry exists. Run before any batch work.
    pub async fn verify_schema(&self, registry: &RelationRegistry) -> Result<()> {
        for relation in registry.definitions() {
            for column in [&relation.column, &relation.primary_key] {
                if !self.column_exists(&relation.child_table, column).await? {
                    return Err(LfkError::InvalidDefinition {
                        parent_table: relation.parent_table.clone(),
                        child_table: relation.child_table.clone(),
                        reason: format!("column {column} does not exist"),
                    });
                }
            }
        }
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (Some(schema), table),
            None => (None, table),
        };

        let row = sqlx::query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.columns
                WHERE table_schema = COALESCE($1, current_schema())
                  AND table_name = $2
                  AND column_name = $3
            )
            "#,
        )
        .bind(schema)
        .bind(table)
        .bind(column)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LfkError::Storage(anyhow!(e)))?;

        Ok(row.0)
    }

    async fn execute_pass(&self, sql: &str, parent_ids: &[i64], limit: i64) -> Result<u64> {
        let result = sqlx::query(sql)
            .bind(parent_ids)
            .bind(limit)
            .execute(&self.pool)
            .await
            .map_err(|e| LfkError::Storage(anyhow!(e)))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CleanupStore for PgCleanupStore {
    #[instrument(
        skip(self, relation, parent_ids, lock_mode),
        fields(
            db.system = "postgresql",
            db.operation = "DELETE",
            db.sql.table = %relation.child_table,
            lock_mode = %lock_mode,
            parents = parent_ids.len()
        )
    )]
    async fn delete_children(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
    ) -> Result<u64> {
        let sql = queries::delete_children(relation, lock_mode);
        self.execute_pass(&sql, parent_ids, limit).await
    }

    #[instrument(
        skip(self, relation, parent_ids, lock_mode),
        fields(
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.sql.table = %relation.child_table,
            lock_mode = %lock_mode,
            parents = parent_ids.len()
        )
    )]
    async fn nullify_children(
        &self,
        relation: &RelationDefinition,
        parent_ids: &[i64],
        lock_mode: LockMode,
        limit: i64,
    ) -> Result<u64> {
        let sql = queries::nullify_children(relation, lock_mode);
        self.execute_pass(&sql, parent_ids, limit).await
    }

    #[instrument(skip(self), fields(db.system = "postgresql", db.operation = "UPDATE"))]
    async fn mark_processed_between(
        &self,
        parent_table: &str,
        first_id: i64,
        last_id: i64,
    ) -> Result<u64> {
        let sql = format!(
            r#"
            UPDATE {DELETED_RECORDS_TABLE}
            SET status = 'processed', processed_at = now()
            WHERE fully_qualified_table_name = $1
              AND id BETWEEN $2 AND $3
              AND status = 'pending'
            "#
        );
        let result = sqlx::query(&sql)
            .bind(parent_table)
            .bind(first_id)
            .bind(last_id)
            .execute(&self.pool)
            .await
            .map_err(|e| LfkError::Storage(anyhow!(e)))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(db.system = "postgresql", db.operation = "SELECT"))]
    async fn load_pending(&self, parent_table: &str, limit: i64) -> Result<Vec<DeletedRecord>> {
        let sql = format!(
            r#"
            SELECT id, fully_qualified_table_name, primary_key_value, status, created_at
            FROM {DELETED_RECORDS_TABLE}
            WHERE fully_qualified_table_name = $1
              AND status = 'pending'
            ORDER BY id
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, PgDeletedRecordRow>(&sql)
            .bind(parent_table)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LfkError::Storage(anyhow!(e)))?;

        rows.into_iter()
            .map(|r| DeletedRecord::try_from(r).map_err(|e| LfkError::Storage(anyhow!(e))))
            .collect()
    }
}
