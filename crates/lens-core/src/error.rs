use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("unreadable path: {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("bundle write failed: {reason}")]
    WriteFailed { reason: String },
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },
    #[error("template read failed: {name}: {reason}")]
    ReadFailed { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {reason}")]
    Io { reason: String },
    #[error("record encode failed: {reason}")]
    Encode { reason: String },
    #[error("record decode failed: {reason}")]
    Decode { reason: String },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backend(#[from] lens_ai::AiError),
    #[error("internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Error)]
pub enum LensError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("internal error: {message}")]
    Internal { message: String },
}
