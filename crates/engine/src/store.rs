//! Workflow store — durable CRUD for workflows plus execution history.
//!
//! [`WorkflowStore`] is the seam the runner and the API write through;
//! [`SqlWorkflowStore`] implements it on top of the `db` repository
//! functions.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use db::models::{ExecutionRow, WorkflowRow};
use db::repository::{executions as exec_repo, workflows as wf_repo};
use db::DbPool;

use crate::models::{ExecutionRecord, Graph, Workflow, WorkflowPatch};
use crate::StoreError;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a new workflow exactly as given.
    async fn create(&self, workflow: &Workflow) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Workflow, StoreError>;

    /// All workflows, most recently modified first.
    async fn list(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Apply `patch` and bump `modified`. Returns the stored result.
    async fn update(&self, id: Uuid, patch: WorkflowPatch) -> Result<Workflow, StoreError>;

    /// Fails with `NotFound` when there is nothing to delete.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Count one more execution and set `last_executed`. Concurrent calls
    /// for the same id never lose an increment.
    async fn record_execution_summary(
        &self,
        id: Uuid,
        last_executed: DateTime<Utc>,
    ) -> Result<Workflow, StoreError>;

    /// Append a finished record to the history.
    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRecord, StoreError>;

    /// History for one workflow, newest first.
    async fn list_executions(&self, workflow_id: Uuid) -> Result<Vec<ExecutionRecord>, StoreError>;
}

/// SQLite-backed store. Every write is a single statement or transaction.
#[derive(Debug, Clone)]
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn to_row(workflow: &Workflow) -> Result<WorkflowRow, StoreError> {
        Ok(WorkflowRow {
            id: workflow.id,
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            definition: serde_json::to_string(&workflow.graph)?,
            created: workflow.created,
            modified: workflow.modified,
            execution_count: i64::try_from(workflow.execution_count).unwrap_or(i64::MAX),
            last_executed: workflow.last_executed,
        })
    }

    fn from_row(row: WorkflowRow) -> Result<Workflow, StoreError> {
        let graph: Graph = serde_json::from_str(&row.definition)?;
        Ok(Workflow {
            id: row.id,
            name: row.name,
            description: row.description,
            graph,
            created: row.created,
            modified: row.modified,
            execution_count: u64::try_from(row.execution_count).unwrap_or(0),
            last_executed: row.last_executed,
        })
    }
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn create(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let row = Self::to_row(workflow)?;
        wf_repo::insert_workflow(&self.pool, &row)
            .await
            .map_err(|e| StoreError::from_db(e, "workflow", workflow.id))?;
        debug!(workflow_id = %workflow.id, "workflow created");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = wf_repo::get_workflow(&self.pool, id)
            .await
            .map_err(|e| StoreError::from_db(e, "workflow", id))?;
        Self::from_row(row)
    }

    async fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows = wf_repo::list_workflows(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        rows.into_iter().map(Self::from_row).collect()
    }

    async fn update(&self, id: Uuid, patch: WorkflowPatch) -> Result<Workflow, StoreError> {
        let mut workflow = self.get(id).await?;
        let previous = workflow.modified;

        if let Some(expected) = patch.expected_modified {
            if expected != previous {
                return Err(StoreError::WriteConflict(format!(
                    "workflow {id} was modified at {previous}, expected {expected}"
                )));
            }
        }

        // `modified` must move forward so compare-and-swap can tell writes apart.
        let modified = Utc::now().max(previous + Duration::microseconds(1));
        patch.apply(&mut workflow, modified);

        let row = Self::to_row(&workflow)?;
        wf_repo::update_workflow(&self.pool, &row, previous)
            .await
            .map_err(|e| StoreError::from_db(e, "workflow", id))?;
        debug!(workflow_id = %id, "workflow updated");
        Ok(workflow)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        wf_repo::delete_workflow(&self.pool, id)
            .await
            .map_err(|e| StoreError::from_db(e, "workflow", id))
    }

    async fn record_execution_summary(
        &self,
        id: Uuid,
        last_executed: DateTime<Utc>,
    ) -> Result<Workflow, StoreError> {
        let row = wf_repo::increment_execution_count(&self.pool, id, last_executed)
            .await
            .map_err(|e| StoreError::from_db(e, "workflow", id))?;
        Self::from_row(row)
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let row = ExecutionRow {
            id: record.execution_id,
            workflow_id: record.workflow_id,
            workflow_name: record.workflow_name.clone(),
            status: record.status.to_string(),
            started_at: record.start_time,
            finished_at: record.end_time,
            record: serde_json::to_string(record)?,
        };
        exec_repo::insert_execution(&self.pool, &row)
            .await
            .map_err(|e| StoreError::from_db(e, "execution", record.execution_id))
    }

    async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRecord, StoreError> {
        let row = exec_repo::get_execution(&self.pool, execution_id)
            .await
            .map_err(|e| StoreError::from_db(e, "execution", execution_id))?;
        Ok(serde_json::from_str(&row.record)?)
    }

    async fn list_executions(&self, workflow_id: Uuid) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = exec_repo::list_executions_for_workflow(&self.pool, workflow_id)
            .await
            .map_err(StoreError::Database)?;
        rows.iter()
            .map(|row| serde_json::from_str(&row.record).map_err(StoreError::from))
            .collect()
    }
}
