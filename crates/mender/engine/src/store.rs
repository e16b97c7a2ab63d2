//! Evaluation store contract and in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use mender_types::{
    EvaluationFilter, FailureContext, FinalStatus, FixAttempt, FixEvaluation, FixId, TriggerRequest,
};

use crate::error::{StoreError, StoreResult};

/// Durable record of fix workflows.
///
/// Evaluations are append-only until sealed. Aggregate status and attempt
/// count are always derived from the stored attempts.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Create an unsealed evaluation holding the captured before-state.
    async fn create(&self, trigger: TriggerRequest, context: FailureContext) -> StoreResult<FixId>;

    async fn append_attempt(&self, id: &FixId, attempt: FixAttempt) -> StoreResult<()>;

    async fn seal(&self, id: &FixId, final_status: FinalStatus) -> StoreResult<()>;

    async fn get(&self, id: &FixId) -> StoreResult<Option<FixEvaluation>>;

    /// Newest first.
    async fn list(&self, filter: EvaluationFilter) -> StoreResult<Vec<FixEvaluation>>;

    /// Returns whether the evaluation existed.
    async fn delete(&self, id: &FixId) -> StoreResult<bool>;

    /// Returns the number of deleted evaluations.
    async fn delete_all(&self) -> StoreResult<u64>;
}

/// Evaluation store held in process memory.
#[derive(Default)]
pub struct InMemoryEvaluationStore {
    evaluations: DashMap<FixId, FixEvaluation>,
}

impl InMemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.evaluations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }

    fn update<F>(&self, id: &FixId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut FixEvaluation) -> Result<(), mender_types::EvaluationError>,
    {
        let mut entry = self
            .evaluations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        f(entry.value_mut())?;
        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for InMemoryEvaluationStore {
    async fn create(&self, trigger: TriggerRequest, context: FailureContext) -> StoreResult<FixId> {
        let id = FixId::generate();
        self.evaluations
            .insert(id.clone(), FixEvaluation::new(id.clone(), trigger, context));
        Ok(id)
    }

    async fn append_attempt(&self, id: &FixId, attempt: FixAttempt) -> StoreResult<()> {
        self.update(id, |evaluation| evaluation.append_attempt(attempt))
    }

    async fn seal(&self, id: &FixId, final_status: FinalStatus) -> StoreResult<()> {
        self.update(id, |evaluation| evaluation.seal(final_status))
    }

    async fn get(&self, id: &FixId) -> StoreResult<Option<FixEvaluation>> {
        Ok(self.evaluations.get(id).map(|e| e.value().clone()))
    }

    async fn list(&self, filter: EvaluationFilter) -> StoreResult<Vec<FixEvaluation>> {
        let mut evaluations: Vec<FixEvaluation> = self
            .evaluations
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        evaluations.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        evaluations.truncate(filter.limit);
        Ok(evaluations)
    }

    async fn delete(&self, id: &FixId) -> StoreResult<bool> {
        Ok(self.evaluations.remove(id).is_some())
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        let count = self.evaluations.len() as u64;
        self.evaluations.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mender_types::{ExecutionStatus, FixPlan};

    fn context() -> FailureContext {
        FailureContext::new(Vec::new(), Vec::new(), serde_json::Value::Null)
    }

    fn attempt(number: u32, status: ExecutionStatus) -> FixAttempt {
        FixAttempt {
            attempt_number: number,
            fix_plan: Some(FixPlan::new("cause", "why")),
            tool_results: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            execution_status: status,
            issues_resolved: status == ExecutionStatus::Success,
            failed_resources: Vec::new(),
            interaction_id: None,
            error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = InMemoryEvaluationStore::new();
        let id = store.create(TriggerRequest::default(), context()).await.unwrap();

        store.append_attempt(&id, attempt(1, ExecutionStatus::Failed)).await.unwrap();
        store.append_attempt(&id, attempt(2, ExecutionStatus::Success)).await.unwrap();
        store.seal(&id, FinalStatus::Success).await.unwrap();

        let evaluation = store.get(&id).await.unwrap().unwrap();
        assert_eq!(evaluation.total_attempts(), 2);
        assert_eq!(evaluation.execution_status(), ExecutionStatus::Success);

        let err = store
            .append_attempt(&id, attempt(3, ExecutionStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Evaluation(_)));
    }

    #[tokio::test]
    async fn test_missing_evaluation() {
        let store = InMemoryEvaluationStore::new();
        let missing = FixId::new("fix_deadbeef");
        assert!(store.get(&missing).await.unwrap().is_none());
        assert!(matches!(
            store.seal(&missing, FinalStatus::Failed).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.delete(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filter_and_delete_all() {
        let store = InMemoryEvaluationStore::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.create(TriggerRequest::default(), context()).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store.seal(&ids[0], FinalStatus::NoActionNeeded).await.unwrap();

        let all = store.list(EvaluationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id(), &ids[2]);

        let filter = EvaluationFilter {
            limit: 10,
            status: Some(ExecutionStatus::NoActionNeeded),
        };
        let done = store.list(filter).await.unwrap();
        assert_eq!(done.len(), 1);

        let limited = store
            .list(EvaluationFilter { limit: 1, status: None })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        assert_eq!(store.delete_all().await.unwrap(), 3);
        assert!(store.is_empty());
    }
}
