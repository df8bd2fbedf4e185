pub mod bundle;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod store;
pub mod types;

pub use crate::error::LensError;
pub use crate::pipeline::{AnalysisPipeline, AnalysisRequest, TaskStatusReport};
