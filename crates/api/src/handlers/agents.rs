use std::path::PathBuf;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use agents::{AgentInfo, ExecutorError};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ExecuteAgentDto {
    pub agent: String,
    #[serde(default)]
    pub args: String,
    /// Project directory the agent runs in.
    #[serde(default)]
    pub project: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteAgentResponse {
    pub success: bool,
    pub output: String,
    pub exit_status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// GET /api/v1/agents
pub async fn list(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.catalog.list())
}

// POST /api/v1/agents/execute — run a single agent outside any workflow
pub async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteAgentDto>,
) -> Result<Json<ExecuteAgentResponse>, ApiError> {
    if !state.catalog.contains(&payload.agent) {
        return Err(ApiError::BadRequest(format!("unknown agent type '{}'", payload.agent)));
    }

    info!("executing agent '{}' directly", payload.agent);
    let outcome = state
        .executor
        .run(&payload.agent, &payload.args, payload.project.as_deref())
        .await;

    let response = match outcome {
        Ok(out) => ExecuteAgentResponse {
            success: out.is_success(),
            output: out.output,
            exit_status: out.exit_status,
            error: None,
        },
        // The agent ran; its failure is the answer, not a server error.
        Err(ExecutorError::NonZeroExit { code, stdout, stderr }) => ExecuteAgentResponse {
            success: false,
            output: stdout,
            exit_status: code,
            error: Some(stderr),
        },
        Err(e) => return Err(e.into()),
    };
    Ok(Json(response))
}
