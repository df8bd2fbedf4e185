pub mod backend;
pub mod git;

pub use crate::backend::{BranchComparison, BranchInfo, RepoInfo, VcsError};
pub use crate::git::GitBackend;
