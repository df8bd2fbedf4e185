use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of flattening a repository into a single text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleOutcome {
    pub file_name: String,
    pub path: String,
    pub total_lines: u64,
    pub limit_reached: bool,
}
