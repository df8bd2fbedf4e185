use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lens_vcs::VcsError;
use serde_json::json;

/// Recoverable failures ride an HTTP 200 with an `error` field so the UI can
/// render them inline; only unexpected internals surface as a 500.
pub fn recoverable(message: impl std::fmt::Display) -> Response {
    Json(json!({ "error": message.to_string() })).into_response()
}

pub fn internal(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message.to_string() })),
    )
        .into_response()
}

pub fn map_vcs_error(err: &VcsError) -> Response {
    match err {
        VcsError::DiffFailed { .. } | VcsError::BackendError { .. } => internal(err),
        VcsError::RepoNotFound | VcsError::RefNotFound { .. } | VcsError::CheckoutFailed { .. } => {
            recoverable(err)
        }
    }
}
