pub mod bundle;
pub mod diff;
pub mod task;

pub use bundle::BundleOutcome;
pub use diff::{DiffFile, DiffHunk, DiffSummary, HunkKind, LineNumber};
pub use task::{StageResult, StageResults, TaskRecord, TaskStatus};
