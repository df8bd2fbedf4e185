use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("repo not found")]
    RepoNotFound,
    #[error("ref not found: {name}")]
    RefNotFound { name: String },
    #[error("diff failed: {reason}")]
    DiffFailed { reason: String },
    #[error("checkout failed: {reason}")]
    CheckoutFailed { reason: String },
    #[error("backend error: {reason}")]
    BackendError { reason: String },
}

/// Working-copy snapshot of a repository, bucketed the way the UI consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoInfo {
    pub current_branch: Option<String>,
    pub modified: Vec<String>,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchInfo {
    pub all: Vec<String>,
    pub current: Option<String>,
}

/// Raw textual output of a branch-to-branch comparison: a unified diff and a
/// `--stat`-style summary. Parsing into structured form happens downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchComparison {
    pub unified: String,
    pub stat: String,
}
