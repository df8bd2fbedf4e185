use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("api key is not configured")]
    MissingApiKey,
    #[error("request failed: {reason}")]
    Http { reason: String },
    #[error("backend rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("upload failed: {reason}")]
    UploadFailed { reason: String },
    #[error("document failed to process: {name}")]
    DocumentFailed { name: String },
    #[error("empty reply from model")]
    EmptyReply,
}

/// Handle to a document the remote backend holds on our behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Processing,
    Active,
    Failed,
}

/// One persistent conversational context against the remote model. Replies
/// depend on everything sent earlier in the same session.
#[async_trait]
pub trait ChatSession: Send {
    async fn send(&mut self, prompt: &str) -> Result<String, AiError>;
}

/// Remote generative-AI service: document upload with asynchronous
/// processing, plus chat sessions seeded with an uploaded document.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn upload_document(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<RemoteDocument, AiError>;

    async fn document_state(&self, name: &str) -> Result<DocumentState, AiError>;

    async fn start_session(
        &self,
        document: &RemoteDocument,
    ) -> Result<Box<dyn ChatSession>, AiError>;
}
