pub mod bus;
pub mod types;

pub use crate::bus::EventBus;
pub use crate::types::{AnalysisStage, StageEvent, StageStatus};
