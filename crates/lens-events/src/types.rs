use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// The four analysis steps, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStage {
    SourceCodeAnalysis,
    DiffAnalysis,
    FeatureReview,
    Guidelines,
}

impl AnalysisStage {
    pub const SEQUENCE: [AnalysisStage; 4] = [
        AnalysisStage::SourceCodeAnalysis,
        AnalysisStage::DiffAnalysis,
        AnalysisStage::FeatureReview,
        AnalysisStage::Guidelines,
    ];

    pub fn template(self) -> &'static str {
        match self {
            AnalysisStage::SourceCodeAnalysis => "source-code-analysis.txt",
            AnalysisStage::DiffAnalysis => "diff-analysis.txt",
            AnalysisStage::FeatureReview => "feature-review.txt",
            AnalysisStage::Guidelines => "guidelines.txt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AnalysisStage::SourceCodeAnalysis => "source code analysis",
            AnalysisStage::DiffAnalysis => "diff analysis",
            AnalysisStage::FeatureReview => "feature review",
            AnalysisStage::Guidelines => "guidelines",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Start,
    Progress,
    Complete,
    Error,
}

impl StageStatus {
    /// Wire-level event name used by the push channel.
    pub fn event_name(self) -> &'static str {
        match self {
            StageStatus::Start => "analysis:start",
            StageStatus::Progress => "analysis:progress",
            StageStatus::Complete => "analysis:complete",
            StageStatus::Error => "analysis:error",
        }
    }
}

/// One stage transition of one task, as delivered to observers.
///
/// `seq` is assigned by the bus at publish time and orders events across all
/// in-flight tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageEvent {
    pub seq: i64,
    pub at: DateTime<Utc>,
    pub task_id: String,
    pub step: AnalysisStage,
    pub status: StageStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageEvent {
    fn new(task_id: &str, step: AnalysisStage, status: StageStatus, message: String) -> Self {
        Self {
            seq: 0,
            at: Utc::now(),
            task_id: task_id.to_string(),
            step,
            status,
            message,
            results: None,
            error: None,
        }
    }

    pub fn start(task_id: &str, step: AnalysisStage, message: impl Into<String>) -> Self {
        Self::new(task_id, step, StageStatus::Start, message.into())
    }

    pub fn progress(task_id: &str, step: AnalysisStage, message: impl Into<String>) -> Self {
        Self::new(task_id, step, StageStatus::Progress, message.into())
    }

    pub fn complete(
        task_id: &str,
        step: AnalysisStage,
        message: impl Into<String>,
        results: Value,
    ) -> Self {
        let mut event = Self::new(task_id, step, StageStatus::Complete, message.into());
        event.results = Some(results);
        event
    }

    pub fn error(
        task_id: &str,
        step: AnalysisStage,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(task_id, step, StageStatus::Error, message.into());
        event.error = Some(error.into());
        event
    }
}
