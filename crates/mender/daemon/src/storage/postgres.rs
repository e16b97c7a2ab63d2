//! PostgreSQL evaluation store

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mender_engine::{EvaluationStore, StoreError, StoreResult};
use mender_types::{
    EvaluationError, EvaluationFilter, FailureContext, FinalStatus, FixAttempt, FixEvaluation,
    FixId, TriggerRequest,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use super::{decode, encode, final_status_label};
use crate::error::StorageError;

/// PostgreSQL-backed evaluation store
#[derive(Debug, Clone)]
pub struct PostgresEvaluationStore {
    pool: PgPool,
}

fn query_error(e: sqlx::Error) -> StoreError {
    StorageError::Query(e.to_string()).into()
}

impl PostgresEvaluationStore {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS fix_evaluations (
                id TEXT PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                status TEXT NOT NULL,
                final_status TEXT,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS fix_evaluations_created_at ON fix_evaluations(created_at DESC);"#,
            r#"CREATE INDEX IF NOT EXISTS fix_evaluations_status ON fix_evaluations(status);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    async fn modify<F>(&self, id: &FixId, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut FixEvaluation) -> Result<(), EvaluationError> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let row = sqlx::query("SELECT data FROM fix_evaluations WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let data: serde_json::Value = row.try_get("data").map_err(query_error)?;
        let mut evaluation = decode(data)?;
        change(&mut evaluation)?;

        sqlx::query(
            "UPDATE fix_evaluations SET status = $2, final_status = $3, data = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(evaluation.execution_status().to_string())
        .bind(final_status_label(&evaluation))
        .bind(encode(&evaluation)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)
    }
}

#[async_trait]
impl EvaluationStore for PostgresEvaluationStore {
    async fn create(&self, trigger: TriggerRequest, context: FailureContext) -> StoreResult<FixId> {
        let evaluation = FixEvaluation::new(FixId::generate(), trigger, context);

        sqlx::query(
            r#"
            INSERT INTO fix_evaluations (id, created_at, status, final_status, data, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(evaluation.id().as_str())
        .bind(evaluation.timestamp())
        .bind(evaluation.execution_status().to_string())
        .bind(final_status_label(&evaluation))
        .bind(encode(&evaluation)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(evaluation.id().clone())
    }

    async fn append_attempt(&self, id: &FixId, attempt: FixAttempt) -> StoreResult<()> {
        self.modify(id, |evaluation| evaluation.append_attempt(attempt)).await
    }

    async fn seal(&self, id: &FixId, final_status: FinalStatus) -> StoreResult<()> {
        self.modify(id, |evaluation| evaluation.seal(final_status)).await
    }

    async fn get(&self, id: &FixId) -> StoreResult<Option<FixEvaluation>> {
        let row = sqlx::query("SELECT data FROM fix_evaluations WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row.try_get("data").map_err(query_error)?;
                Ok(Some(decode(data)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, filter: EvaluationFilter) -> StoreResult<Vec<FixEvaluation>> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let query = match filter.status {
            Some(status) => sqlx::query(
                "SELECT data FROM fix_evaluations WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
            )
            .bind(status.to_string())
            .bind(limit),
            None => sqlx::query("SELECT data FROM fix_evaluations ORDER BY created_at DESC LIMIT $1")
                .bind(limit),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(query_error)?;
        rows.into_iter()
            .map(|row| {
                let data: serde_json::Value = row.try_get("data").map_err(query_error)?;
                Ok(decode(data)?)
            })
            .collect()
    }

    async fn delete(&self, id: &FixId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM fix_evaluations WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM fix_evaluations")
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }
}
