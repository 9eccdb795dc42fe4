use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use engine::templates::{self, WorkflowTemplate};
use engine::{Workflow, WorkflowDraft, WorkflowPatch};

use crate::{ApiError, AppState};

// GET /api/v1/templates
pub async fn templates() -> Json<Vec<WorkflowTemplate>> {
    Json(templates::templates())
}

// GET /api/v1/workflows — most recently modified first
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

// GET /api/v1/workflows/:id
pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.store.get(id).await?))
}

// POST /api/v1/workflows
//
// Dangling edges and duplicate ids are rejected here; cycles are only
// reported when the workflow is executed, so a half-edited graph can still be
// saved.
pub async fn create(
    State(state): State<AppState>,
    Json(mut draft): Json<WorkflowDraft>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    if draft.name.trim().is_empty() {
        return Err(ApiError::BadRequest("workflow name must not be empty".into()));
    }
    if draft.graph.nodes.is_empty() {
        draft.graph = templates::starter_graph();
    }
    engine::validate(&draft.graph)?;

    let workflow = draft.into_workflow();
    state.store.create(&workflow).await?;
    info!("created workflow '{}' ({})", workflow.name, workflow.id);
    Ok((StatusCode::CREATED, Json(workflow)))
}

// PUT /api/v1/workflows/:id
pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(patch): Json<WorkflowPatch>,
) -> Result<Json<Workflow>, ApiError> {
    if let Some(graph) = &patch.graph {
        engine::validate(graph)?;
    }
    Ok(Json(state.store.update(id, patch).await?))
}

// DELETE /api/v1/workflows/:id
pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
