use std::path::Path;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use lens_core::bundle::{self, FileEntry};
use lens_vcs::GitBackend;

use crate::routes::error::recoverable;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct BrowseFilesInput {
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BrowseFilesResponse {
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FileContentInput {
    pub path: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSourceFileInput {
    pub repo_path: String,
    pub main_branch: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSourceFileResponse {
    pub success: bool,
    pub file_name: String,
    pub path: String,
    pub total_lines: u64,
    pub limit_reached: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/browse-files", post(browse_files))
        .route("/get-file-content", post(get_file_content))
        .route("/generate-source-file", post(generate_source_file))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/browse-files",
    request_body = BrowseFilesInput,
    responses((status = 200, body = BrowseFilesResponse))
)]
pub(crate) async fn browse_files(
    State(_state): State<AppState>,
    Json(input): Json<BrowseFilesInput>,
) -> Response {
    match bundle::list_files(Path::new(&input.path)) {
        Ok(files) => Json(BrowseFilesResponse { files }).into_response(),
        Err(err) => recoverable(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/get-file-content",
    request_body = FileContentInput,
    responses((status = 200))
)]
pub(crate) async fn get_file_content(
    State(_state): State<AppState>,
    Json(input): Json<FileContentInput>,
) -> Response {
    match bundle::file_content(Path::new(&input.path)) {
        Ok(content) => Json(json!({ "content": content })).into_response(),
        Err(err) => recoverable(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/generate-source-file",
    request_body = GenerateSourceFileInput,
    responses((status = 200, body = GenerateSourceFileResponse))
)]
pub(crate) async fn generate_source_file(
    State(state): State<AppState>,
    Json(input): Json<GenerateSourceFileInput>,
) -> Response {
    let repo_path = Path::new(&input.repo_path);
    if let Err(err) = GitBackend::checkout(repo_path, &input.main_branch) {
        return Json(json!({ "success": false, "error": err.to_string() })).into_response();
    }
    match state.bundler.bundle(repo_path) {
        Ok(outcome) => Json(GenerateSourceFileResponse {
            success: true,
            file_name: outcome.file_name,
            path: outcome.path,
            total_lines: outcome.total_lines,
            limit_reached: outcome.limit_reached,
        })
        .into_response(),
        Err(err) => Json(json!({ "success": false, "error": err.to_string() })).into_response(),
    }
}
