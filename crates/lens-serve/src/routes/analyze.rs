use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use lens_core::types::TaskStatus;
use lens_core::{AnalysisRequest, TaskStatusReport};

use crate::routes::error::internal;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeInput {
    /// Path to the repository to bundle and analyze.
    pub source_code: String,
    pub feature_scope: String,
    #[serde(default)]
    pub main_branch: Option<String>,
    #[serde(default)]
    pub feature_branch: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeStartedResponse {
    pub task_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze/source-code", post(analyze_source_code))
        .route("/analyze/task/{task_id}", get(task_status))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/analyze/source-code",
    request_body = AnalyzeInput,
    responses((status = 200, body = AnalyzeStartedResponse))
)]
pub(crate) async fn analyze_source_code(
    State(state): State<AppState>,
    Json(input): Json<AnalyzeInput>,
) -> Response {
    let request = AnalysisRequest {
        repo_path: PathBuf::from(input.source_code),
        feature_scope: input.feature_scope,
        main_branch: input.main_branch.unwrap_or_else(|| "main".to_string()),
        feature_branch: input.feature_branch.unwrap_or_default(),
    };
    let task_id = state.pipeline.spawn(request);
    tracing::info!(%task_id, "analysis task started");
    Json(AnalyzeStartedResponse {
        task_id,
        status: "started",
        message: "Analysis started; progress is pushed over the events channel",
    })
    .into_response()
}

#[utoipa::path(
    get,
    path = "/api/analyze/task/{task_id}",
    params(("task_id" = String, Path, description = "Task ID returned by analyze")),
    responses((status = 200))
)]
pub(crate) async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.pipeline.status(&task_id) {
        Ok(TaskStatusReport::Completed(record)) => Json(json!({
            "taskId": task_id,
            "status": TaskStatus::Completed,
            "results": record.results,
        }))
        .into_response(),
        Ok(TaskStatusReport::InProgress) => Json(json!({
            "taskId": task_id,
            "status": TaskStatus::InProgress,
            "message": "Analysis is still in progress",
        }))
        .into_response(),
        Err(err) => internal(err),
    }
}
