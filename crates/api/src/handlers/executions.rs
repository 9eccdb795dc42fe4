use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use engine::{ExecutionRecord, RunError, RunOptions, RunSnapshot};

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    /// Block until the run finishes and return its record.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionAccepted {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub execution_order: Vec<String>,
}

/// A run is either still in flight or finished and recorded.
#[derive(Debug, Serialize)]
#[serde(tag = "state", content = "execution", rename_all = "camelCase")]
pub enum ExecutionView {
    Running(RunSnapshot),
    Finished(ExecutionRecord),
}

// POST /api/v1/workflows/:id/execute[?wait=true]
//
// The graph is validated before anything is accepted. Without `wait` the run
// continues in the background and progress is reported over /ws.
pub async fn execute(
    Path(id): Path<Uuid>,
    Query(query): Query<ExecuteQuery>,
    State(state): State<AppState>,
    body: Option<Json<ExecuteWorkflowDto>>,
) -> Result<Response, ApiError> {
    let Json(dto) = body.unwrap_or_default();
    let workflow = state.store.get(id).await?;
    let prepared = state.runner.prepare(
        &workflow,
        RunOptions { working_directory: dto.working_directory },
    )?;

    let accepted = ExecutionAccepted {
        execution_id: prepared.execution_id(),
        workflow_id: workflow.id,
        execution_order: prepared.order().to_vec(),
    };
    let runner = state.runner.clone();
    let task = tokio::spawn(async move { runner.execute(prepared).await });

    if query.wait {
        // The run lives on its own task; a client that goes away only stops
        // waiting for it.
        let record = task
            .await
            .map_err(|e| ApiError::Internal(format!("execution task failed: {e}")))??;
        return Ok(Json(record).into_response());
    }

    tokio::spawn(async move {
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(RunError::Persist { record, source })) => {
                error!("execution {} was not recorded: {}", record.execution_id, source);
            }
            Ok(Err(e)) => warn!("execution failed: {}", e),
            Err(e) => error!("execution task failed: {}", e),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

// GET /api/v1/workflows/:id/executions — newest first
pub async fn history(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExecutionRecord>>, ApiError> {
    // Distinguish "no runs yet" from "no such workflow".
    state.store.get(id).await?;
    Ok(Json(state.store.list_executions(id).await?))
}

// GET /api/v1/executions/:id
pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionView>, ApiError> {
    if let Some(snapshot) = state.runner.snapshot(id) {
        return Ok(Json(ExecutionView::Running(snapshot)));
    }
    Ok(Json(ExecutionView::Finished(state.store.get_execution(id).await?)))
}

// POST /api/v1/executions/:id/cancel
pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.runner.cancel(id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("no active execution {id}")))
    }
}
