use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HunkKind {
    Header,
    Addition,
    Deletion,
    Context,
}

/// Line numbers a hunk line maps to. Additions only exist on the new side,
/// deletions only on the old side, context lines on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineNumber {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    #[serde(rename = "type")]
    pub kind: HunkKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<LineNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiffFile {
    pub file: String,
    pub hunks: Vec<DiffHunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiffSummary {
    pub files: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
}
