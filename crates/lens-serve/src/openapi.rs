use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::routes::analyze::{AnalyzeInput, AnalyzeStartedResponse};
use crate::routes::files::{
    BrowseFilesInput, BrowseFilesResponse, FileContentInput, GenerateSourceFileInput,
    GenerateSourceFileResponse,
};
use crate::routes::repos::{
    BranchesInput, BranchesResponse, CheckRepoInput, CheckRepoResponse, CompareBranchesInput,
    CompareBranchesResponse,
};
use lens_core::bundle::FileEntry;
use lens_core::types::{
    BundleOutcome, DiffFile, DiffHunk, DiffSummary, HunkKind, LineNumber, StageResult,
    StageResults, TaskRecord, TaskStatus,
};
use lens_events::{AnalysisStage, StageEvent, StageStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::repos::check_repo,
        crate::routes::repos::get_branches,
        crate::routes::repos::compare_branches,
        crate::routes::files::browse_files,
        crate::routes::files::get_file_content,
        crate::routes::files::generate_source_file,
        crate::routes::analyze::analyze_source_code,
        crate::routes::analyze::task_status,
        crate::socket::ws_handler
    ),
    components(schemas(
        CheckRepoInput,
        CheckRepoResponse,
        BranchesInput,
        BranchesResponse,
        CompareBranchesInput,
        CompareBranchesResponse,
        BrowseFilesInput,
        BrowseFilesResponse,
        FileContentInput,
        GenerateSourceFileInput,
        GenerateSourceFileResponse,
        AnalyzeInput,
        AnalyzeStartedResponse,
        FileEntry,
        BundleOutcome,
        DiffFile,
        DiffHunk,
        DiffSummary,
        HunkKind,
        LineNumber,
        StageResult,
        StageResults,
        TaskRecord,
        TaskStatus,
        AnalysisStage,
        StageStatus,
        StageEvent
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new().merge(SwaggerUi::new("/docs").url("/api/openapi.json", ApiDoc::openapi()))
}
