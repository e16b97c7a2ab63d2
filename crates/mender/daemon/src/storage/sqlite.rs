//! SQLite evaluation store

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use mender_engine::{EvaluationStore, StoreError, StoreResult};
use mender_types::{
    EvaluationError, EvaluationFilter, FailureContext, FinalStatus, FixAttempt, FixEvaluation,
    FixId, TriggerRequest,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::{decode, encode, final_status_label};
use crate::error::StorageError;

/// SQLite-backed evaluation store
#[derive(Debug, Clone)]
pub struct SqliteEvaluationStore {
    pool: SqlitePool,
}

fn query_error(e: sqlx::Error) -> StoreError {
    StorageError::Query(e.to_string()).into()
}

fn decode_text(data: &str) -> Result<FixEvaluation, StorageError> {
    let value = serde_json::from_str(data).map_err(|e| StorageError::InvalidData(e.to_string()))?;
    decode(value)
}

fn encode_text(evaluation: &FixEvaluation) -> Result<String, StorageError> {
    Ok(encode(evaluation)?.to_string())
}

impl SqliteEvaluationStore {
    /// Open (creating if missing) the database at `url` and initialize schema.
    ///
    /// In-memory URLs need `max_connections = 1`: every connection gets its own database.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
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
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                final_status TEXT,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
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

        let row = sqlx::query("SELECT data FROM fix_evaluations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let data: String = row.try_get("data").map_err(query_error)?;
        let mut evaluation = decode_text(&data)?;
        change(&mut evaluation)?;

        sqlx::query(
            "UPDATE fix_evaluations SET status = ?2, final_status = ?3, data = ?4, updated_at = ?5 WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(evaluation.execution_status().to_string())
        .bind(final_status_label(&evaluation))
        .bind(encode_text(&evaluation)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)
    }
}

#[async_trait]
impl EvaluationStore for SqliteEvaluationStore {
    async fn create(&self, trigger: TriggerRequest, context: FailureContext) -> StoreResult<FixId> {
        let evaluation = FixEvaluation::new(FixId::generate(), trigger, context);

        sqlx::query(
            r#"
            INSERT INTO fix_evaluations (id, created_at, status, final_status, data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(evaluation.id().as_str())
        .bind(evaluation.timestamp())
        .bind(evaluation.execution_status().to_string())
        .bind(final_status_label(&evaluation))
        .bind(encode_text(&evaluation)?)
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
        let row = sqlx::query("SELECT data FROM fix_evaluations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(query_error)?;
                Ok(Some(decode_text(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, filter: EvaluationFilter) -> StoreResult<Vec<FixEvaluation>> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let query = match filter.status {
            Some(status) => sqlx::query(
                "SELECT data FROM fix_evaluations WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .bind(status.to_string())
            .bind(limit),
            None => sqlx::query("SELECT data FROM fix_evaluations ORDER BY created_at DESC LIMIT ?1")
                .bind(limit),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(query_error)?;
        rows.into_iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(query_error)?;
                Ok(decode_text(&data)?)
            })
            .collect()
    }

    async fn delete(&self, id: &FixId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM fix_evaluations WHERE id = ?1")
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

#[cfg(test)]
mod tests {
    use super::*;
    use mender_types::{
        ExecutionStatus, FixPlan, HealthStatus, ResourceDescriptor, ResourceKind, ResourceStatus,
    };

    async fn store() -> SqliteEvaluationStore {
        SqliteEvaluationStore::new("sqlite::memory:", 1).await.unwrap()
    }

    fn context() -> FailureContext {
        let cache = ResourceDescriptor::new("cache-1", "redis", ResourceKind::Cache);
        FailureContext::new(
            vec![ResourceStatus::observed(&cache, HealthStatus::Failed, Default::default())],
            Vec::new(),
            serde_json::json!({"name": "shop"}),
        )
    }

    fn attempt(number: u32) -> FixAttempt {
        FixAttempt {
            attempt_number: number,
            fix_plan: Some(FixPlan::new("memory", "flush")),
            tool_results: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            execution_status: ExecutionStatus::Failed,
            issues_resolved: false,
            failed_resources: Vec::new(),
            interaction_id: None,
            error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_evaluation_survives_round_trip_through_rows() {
        let store = store().await;
        let id = store.create(TriggerRequest::default(), context()).await.unwrap();
        store.append_attempt(&id, attempt(1)).await.unwrap();
        store.seal(&id, FinalStatus::Failed).await.unwrap();

        let evaluation = store.get(&id).await.unwrap().unwrap();
        assert_eq!(evaluation.failure_context().resources.len(), 1);
        assert_eq!(evaluation.total_attempts(), 1);
        assert_eq!(evaluation.final_status(), Some(FinalStatus::Failed));

        let err = store.append_attempt(&id, attempt(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Evaluation(EvaluationError::Sealed(_))));
    }

    #[tokio::test]
    async fn test_list_filters_on_status_column() {
        let store = store().await;
        let a = store.create(TriggerRequest::default(), context()).await.unwrap();
        let b = store.create(TriggerRequest::default(), context()).await.unwrap();
        store.seal(&a, FinalStatus::NoActionNeeded).await.unwrap();

        let filter = EvaluationFilter {
            limit: 10,
            status: Some(ExecutionStatus::NoActionNeeded),
        };
        let listed = store.list(filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), &a);

        assert_eq!(store.list(EvaluationFilter::default()).await.unwrap().len(), 2);
        assert!(store.delete(&b).await.unwrap());
        assert!(!store.delete(&b).await.unwrap());
        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert!(store.get(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_evaluation() {
        let store = store().await;
        let err = store
            .seal(&FixId::new("fix_12345678"), FinalStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
