use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

/// A single stage's outcome. When the model reply is not valid JSON the stage
/// still completes, carrying the raw text alongside the parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum StageResult {
    Degraded {
        error: String,
        #[serde(rename = "rawResponse")]
        raw_response: String,
    },
    Parsed(Value),
}

impl StageResult {
    pub fn is_degraded(&self) -> bool {
        matches!(self, StageResult::Degraded { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_code_analysis: Option<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_analysis: Option<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_review: Option<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidelines: Option<StageResult>,
}

impl StageResults {
    pub fn from_parts(
        source_code_analysis: StageResult,
        diff_analysis: StageResult,
        feature_review: StageResult,
        guidelines: StageResult,
    ) -> Self {
        Self {
            source_code_analysis: Some(source_code_analysis),
            diff_analysis: Some(diff_analysis),
            feature_review: Some(feature_review),
            guidelines: Some(guidelines),
        }
    }
}

/// Persisted record of a finished analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: String,
    pub repo_path: String,
    pub feature_scope: String,
    pub main_branch: String,
    pub feature_branch: String,
    pub bundle_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_document: Option<String>,
    pub results: StageResults,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn degraded_result_keeps_raw_response_key() {
        let result = StageResult::Degraded {
            error: "Failed to parse AI response as JSON".to_string(),
            raw_response: "not json".to_string(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["rawResponse"], "not json");
        assert!(value.get("error").is_some());
    }

    #[test]
    fn degraded_shape_deserializes_as_degraded() {
        let value = json!({"error": "boom", "rawResponse": "text"});
        let result: StageResult = serde_json::from_value(value).unwrap();
        assert!(result.is_degraded());
    }

    #[test]
    fn arbitrary_object_deserializes_as_parsed() {
        let value = json!({"architecture": "mvc", "modules": []});
        let result: StageResult = serde_json::from_value(value).unwrap();
        assert!(!result.is_degraded());
    }
}
