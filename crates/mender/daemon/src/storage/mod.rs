//! Evaluation storage backends
//!
//! SQL stores keep one row per evaluation with the full record serialized
//! into a `data` column. Aggregate status is denormalized into `status` for
//! filtering and rewritten on every change.

mod postgres;
mod sqlite;

use std::sync::Arc;

use mender_engine::{EvaluationStore, InMemoryEvaluationStore};
use mender_types::FixEvaluation;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::StorageError;

pub use postgres::PostgresEvaluationStore;
pub use sqlite::SqliteEvaluationStore;

/// Open the configured evaluation store.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn EvaluationStore>, StorageError> {
    let store: Arc<dyn EvaluationStore> = match config {
        StorageConfig::Memory => {
            info!("Using in-memory evaluation store");
            Arc::new(InMemoryEvaluationStore::new())
        }
        StorageConfig::Sqlite {
            url,
            max_connections,
        } => {
            info!(url = %url, "Using SQLite evaluation store");
            Arc::new(SqliteEvaluationStore::new(url, *max_connections).await?)
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            info!("Using PostgreSQL evaluation store");
            Arc::new(PostgresEvaluationStore::new(url, *max_connections, *connect_timeout_secs).await?)
        }
    };
    Ok(store)
}

fn encode(evaluation: &FixEvaluation) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(evaluation).map_err(|e| StorageError::InvalidData(e.to_string()))
}

fn decode(data: serde_json::Value) -> Result<FixEvaluation, StorageError> {
    serde_json::from_value(data).map_err(|e| StorageError::InvalidData(e.to_string()))
}

fn final_status_label(evaluation: &FixEvaluation) -> Option<String> {
    evaluation.final_status().and_then(|s| {
        serde_json::to_value(s)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
    })
}
