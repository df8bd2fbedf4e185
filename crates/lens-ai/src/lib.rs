pub mod backend;
pub mod gemini;

pub use crate::backend::{AiError, ChatSession, DocumentState, GenerativeBackend, RemoteDocument};
pub use crate::gemini::{GeminiBackend, GeminiConfig};
