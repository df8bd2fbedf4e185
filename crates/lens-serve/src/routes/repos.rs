use std::path::Path;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use lens_core::diff::{parse_diff, parse_stat_summary};
use lens_core::types::{DiffFile, DiffSummary};
use lens_vcs::GitBackend;

use crate::routes::error::map_vcs_error;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckRepoInput {
    pub repo_path: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckRepoResponse {
    pub is_repo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_branch: Option<String>,
    pub modified: Vec<String>,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BranchesInput {
    pub repo_path: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BranchesResponse {
    pub all: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompareBranchesInput {
    pub repo_path: String,
    pub target_branch: String,
    #[serde(default)]
    pub main_branch: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompareBranchesResponse {
    pub summary: DiffSummary,
    pub diff: Vec<DiffFile>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check-repo", post(check_repo))
        .route("/get-branches", post(get_branches))
        .route("/compare-branches", post(compare_branches))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/check-repo",
    request_body = CheckRepoInput,
    responses((status = 200, body = CheckRepoResponse))
)]
pub(crate) async fn check_repo(
    State(_state): State<AppState>,
    Json(input): Json<CheckRepoInput>,
) -> Response {
    match GitBackend::repo_info(Path::new(&input.repo_path)) {
        Ok(info) => Json(CheckRepoResponse {
            is_repo: true,
            current_branch: info.current_branch,
            modified: info.modified,
            created: info.created,
            deleted: info.deleted,
            renamed: info.renamed,
        })
        .into_response(),
        Err(err) => Json(json!({ "isRepo": false, "error": err.to_string() })).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/get-branches",
    request_body = BranchesInput,
    responses((status = 200, body = BranchesResponse))
)]
pub(crate) async fn get_branches(
    State(_state): State<AppState>,
    Json(input): Json<BranchesInput>,
) -> Response {
    match GitBackend::branches(Path::new(&input.repo_path)) {
        Ok(branches) => Json(BranchesResponse {
            all: branches.all,
            current: branches.current,
        })
        .into_response(),
        Err(err) => map_vcs_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/compare-branches",
    request_body = CompareBranchesInput,
    responses((status = 200, body = CompareBranchesResponse))
)]
pub(crate) async fn compare_branches(
    State(_state): State<AppState>,
    Json(input): Json<CompareBranchesInput>,
) -> Response {
    let comparison = GitBackend::compare(
        Path::new(&input.repo_path),
        &input.target_branch,
        input.main_branch.as_deref(),
    );
    match comparison {
        Ok(comparison) => Json(CompareBranchesResponse {
            summary: parse_stat_summary(&comparison.stat),
            diff: parse_diff(&comparison.unified),
        })
        .into_response(),
        Err(err) => map_vcs_error(&err),
    }
}
